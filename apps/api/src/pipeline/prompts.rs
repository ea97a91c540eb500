// All LLM prompt templates for the three stages, plus the pure assembly
// function that fills them. Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, MARKDOWN_ONLY_SYSTEM};
use crate::pipeline::{SearchPreferences, Stage, StageContext, StagePrompt, WorkArrangement};

// ────────────────────────────────────────────────────────────────────────────
// Research
// ────────────────────────────────────────────────────────────────────────────

/// Replace: {job_kind}, {topic}
pub const RESEARCH_SYSTEM: &str = "ROLE: Senior Job Market Researcher.
GOAL: Find the best {job_kind} opportunities for {topic} positions matching candidate preferences.
BACKGROUND: You are an expert job market researcher with 15+ years of experience in talent \
acquisition and job market analysis. You know LinkedIn, Indeed, Glassdoor and niche job boards. \
You identify both well-known opportunities at top companies and hidden gems at growing startups. \
You understand salary benchmarks, market trends, and what makes a job posting legitimate and \
worthwhile. You prioritize positions that match the candidate's stated preferences for work \
arrangement and compensation.";

/// Replace: {topic}, {preferences}, {work_type}, {evidence}
pub const RESEARCH_TASK_TEMPLATE: &str = "Review the latest job opportunities related to: {topic}

{preferences}

Your task:
1. Use the search results below as your source of current job openings for {topic} positions
2. Filter for {work_type} positions when possible
3. Report at least 5-7 relevant job postings (fewer only if the results contain fewer)
4. For each job, extract:
   - Job title (exact title from posting)
   - Company name
   - Location and work arrangement (Remote/Hybrid/On-site)
   - Key requirements and qualifications (list ALL mentioned skills)
   - Required years of experience
   - Salary range (if available)
   - Application URL or platform
5. Identify the TOP 3 most promising opportunities based on candidate preferences
6. List ALL unique technical skills and tools mentioned across all postings

Focus on jobs from reputable companies. Prioritize positions matching the candidate's work type \
preference: {work_type}.

SEARCH RESULTS:
{evidence}";

pub const RESEARCH_EXPECTED_OUTPUT: &str = "A structured job search report in this EXACT format:

## Job Opportunities Found

### Job 1: [Title] at [Company]
- **Location**: [City/Remote/Hybrid]
- **Requirements**: [Bullet list of key requirements]
- **Skills Needed**: [Comma-separated list]
- **Experience**: [X years]
- **Salary**: [Range if available]
- **Apply**: [URL]

[Repeat for all 5-7 jobs]

## Top 3 Recommended Positions
1. [Job Title at Company] - [Why it's a good fit]
2. [Job Title at Company] - [Why it's a good fit]
3. [Job Title at Company] - [Why it's a good fit]

## Skills in Demand (Aggregated)
- Technical Skills: [List]
- Soft Skills: [List]
- Tools/Platforms: [List]
- Certifications: [List if any]";

// ────────────────────────────────────────────────────────────────────────────
// Gap analysis
// ────────────────────────────────────────────────────────────────────────────

pub const GAP_ANALYSIS_SYSTEM: &str = "ROLE: Senior Technical Recruiter & ATS Expert.
GOAL: Perform deep keyword analysis between resume and job requirements to maximize ATS compatibility.
BACKGROUND: You are a Senior Technical Recruiter with 12+ years of experience at Fortune 500 \
companies and top tech firms. You have reviewed over 50,000 resumes and understand exactly how \
Applicant Tracking Systems work. Your expertise: keyword optimization (must-haves versus \
nice-to-haves), skills gap analysis (missing skills, certifications and tools), match scoring \
(required qualifications, preferred qualifications, years of experience) and competitive \
positioning. You are brutally honest in your assessments because you want candidates to succeed.";

/// Replace: {resume_text}
pub const GAP_ANALYSIS_TASK_TEMPLATE: &str = "Perform a comprehensive keyword and skills gap analysis.

Candidate's Resume:
{resume_text}

Your task:
1. Extract ALL keywords from the resume:
   - Technical skills
   - Tools and technologies
   - Soft skills
   - Certifications
   - Industry terms

2. Compare against job requirements from the research and identify:
   - MATCHING KEYWORDS: Skills in resume that match job requirements
   - MISSING KEYWORDS: Critical skills in jobs NOT in resume
   - PARTIAL MATCHES: Similar skills that need rewording

3. Calculate a MATCH SCORE (0-100%) for each of the top 3 jobs based on:
   - Required skills match (40% weight)
   - Experience alignment (30% weight)
   - Preferred qualifications (20% weight)
   - Soft skills match (10% weight)

4. Provide SPECIFIC keyword recommendations:
   - Exact phrases to add to resume
   - Skills to learn/acquire
   - Certifications that would boost candidacy

Be specific and data-driven in your analysis.";

pub const GAP_ANALYSIS_EXPECTED_OUTPUT: &str = "A detailed analysis report in this EXACT format:

## Resume Keyword Analysis

### Keywords Found in Resume
- **Technical Skills**: [List]
- **Tools/Technologies**: [List]
- **Soft Skills**: [List]
- **Certifications**: [List]

## Match Analysis

### Job 1: [Title] at [Company]
- **Match Score**: [X]%
- **Matching Keywords**: [List of matching skills]
- **Missing Keywords**: [List of gaps - CRITICAL]
- **Recommendation**: [Specific advice]

[Repeat for top 3 jobs]

## Keyword Gap Summary

### Critical Missing Skills (Add to Resume)
1. [Skill] - Required by X/Y jobs
2. [Skill] - Required by X/Y jobs

### Skills to Learn/Acquire
1. [Skill] - [Why important]

### Recommended Certifications
1. [Certification] - [Impact on candidacy]

## Candidate Strengths
- [Unique selling point 1]
- [Unique selling point 2]
- [Unique selling point 3]";

// ────────────────────────────────────────────────────────────────────────────
// Compose
// ────────────────────────────────────────────────────────────────────────────

pub const COMPOSE_SYSTEM: &str = "ROLE: Executive Career Content Strategist.
GOAL: Create a comprehensive, professionally formatted Job Application Report.
BACKGROUND: You have helped C-level executives, senior engineers and professionals at all \
levels land positions at top companies. Your expertise includes ATS-optimized resume writing \
with powerful action verbs and metrics, compelling cover letters that tell a story and show \
cultural fit, interview preparation, and LinkedIn profile optimization for recruiter \
visibility. You always deliver clean, well-structured Markdown.";

/// Replace: {topic}, {work_type}
pub const COMPOSE_TASK_TEMPLATE: &str = "Create a comprehensive Job Application Report based on the job research and resume analysis.

Produce a PROFESSIONALLY FORMATTED report with these sections:

1. EXECUTIVE SUMMARY
   - Overall match assessment
   - Top recommended job with match score
   - Key action items

2. TAILORED COVER LETTER
   - Professional, customizable template
   - Placeholders for [Company Name] and [Position]
   - Highlights matching skills from analysis
   - Addresses gaps positively
   - Under 350 words, compelling narrative

3. OPTIMIZED RESUME BULLETS
   - 7-10 powerful bullet points
   - Incorporate missing keywords naturally
   - Use metrics and quantifiable achievements
   - ATS-friendly formatting

4. INTERVIEW PREPARATION
   - 5 likely interview questions based on job requirements
   - Suggested answers incorporating candidate's experience
   - Key talking points

5. LINKEDIN OPTIMIZATION
   - Suggested headline (120 chars max)
   - Summary paragraph (2000 chars max)
   - Skills to add to profile

Target role: {topic}
Work preference: {work_type}";

pub const COMPOSE_EXPECTED_OUTPUT: &str = "# Job Application Report

## Executive Summary
- **Best Match**: [Job Title] at [Company] - [X]% Match
- **Overall Assessment**: [2-3 sentence summary]
- **Key Action Items**:
  1. [Action 1]
  2. [Action 2]
  3. [Action 3]

---

## Tailored Cover Letter

[Professional cover letter with [Company Name] and [Position] placeholders]

---

## Optimized Resume Bullets

### Experience Highlights
1. [Strong action verb] + [Task] + [Quantifiable result]

### Skills Section Additions
- Add: [Skill 1], [Skill 2], [Skill 3]
- Reword: \"[Current phrasing]\" -> \"[Optimized phrasing]\"

---

## Interview Preparation

### Likely Questions
1. **[Question 1]**
   - *Suggested Answer*: [Answer incorporating experience]

### Key Talking Points
- [Point 1]

---

## LinkedIn Optimization

### Suggested Headline
[Optimized headline under 120 characters]

### Suggested Summary
[Professional summary paragraph]

### Skills to Add
[List of skills to add to LinkedIn profile]

---

## Next Steps
1. [Immediate action]
2. [Short-term action]
3. [Long-term action]";

/// Replace: {work_type}, {salary_range}, {experience_level}
pub const PREFERENCES_TEMPLATE: &str = "Candidate Preferences:
- Work Type: {work_type}
- Salary Range: {salary_range}
- Experience Level: {experience_level}";

// ────────────────────────────────────────────────────────────────────────────
// Assembly
// ────────────────────────────────────────────────────────────────────────────

/// Builds the prompt for `stage`. Pure: identical inputs give identical bytes.
///
/// `evidence` is the rendered search material and is only used by research.
/// Every output already in `context` is appended verbatim.
pub fn build_stage_prompt(
    stage: Stage,
    preferences: &SearchPreferences,
    resume_text: &str,
    evidence: Option<&str>,
    context: &StageContext,
) -> StagePrompt {
    let topic = preferences.topic.trim();
    let work_type = preferences.work_arrangement.label();
    let job_kind = match preferences.work_arrangement {
        WorkArrangement::Any => "job".to_string(),
        other => format!("{} job", other.label().to_lowercase()),
    };
    let preferences_block = fill_template(
        PREFERENCES_TEMPLATE,
        &[
            ("work_type", work_type),
            ("salary_range", preferences.salary_band.label()),
            ("experience_level", preferences.experience_level.label()),
        ],
    );

    let (system, task, expected) = match stage {
        Stage::Research => (
            fill_template(
                RESEARCH_SYSTEM,
                &[("job_kind", job_kind.as_str()), ("topic", topic)],
            ),
            fill_template(
                RESEARCH_TASK_TEMPLATE,
                &[
                    ("topic", topic),
                    ("preferences", preferences_block.as_str()),
                    ("work_type", work_type),
                    (
                        "evidence",
                        evidence.unwrap_or("No search results were provided."),
                    ),
                ],
            ),
            RESEARCH_EXPECTED_OUTPUT,
        ),
        Stage::GapAnalysis => (
            GAP_ANALYSIS_SYSTEM.to_string(),
            fill_template(
                GAP_ANALYSIS_TASK_TEMPLATE,
                &[("resume_text", resume_text.trim())],
            ),
            GAP_ANALYSIS_EXPECTED_OUTPUT,
        ),
        Stage::Compose => (
            COMPOSE_SYSTEM.to_string(),
            fill_template(
                COMPOSE_TASK_TEMPLATE,
                &[("topic", topic), ("work_type", work_type)],
            ),
            COMPOSE_EXPECTED_OUTPUT,
        ),
    };

    let mut task = format!("{task}\n\n{GROUNDING_INSTRUCTION}\n\nEXPECTED OUTPUT:\n{expected}");
    if !context.is_empty() {
        task.push_str("\n\nCONTEXT FROM PREVIOUS STAGES:");
        for output in context.outputs() {
            task.push_str(&format!(
                "\n\n=== {} ({}) ===\n{}",
                output.stage.label(),
                output.stage.key(),
                output.text
            ));
        }
    }

    StagePrompt {
        system: format!("{system}\n\n{MARKDOWN_ONLY_SYSTEM}"),
        task,
    }
}

/// Single-pass `{name}` substitution. Inserted values are never rescanned, so
/// user text containing braces cannot pull in other fields.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replacement = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match replacement {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{backend_remote, RESUME};
    use crate::pipeline::{ExperienceLevel, SalaryBand};

    #[test]
    fn test_fill_template_replaces_known_keys() {
        let out = fill_template("Hi {name}, {greeting}!", &[("name", "Ada"), ("greeting", "welcome")]);
        assert_eq!(out, "Hi Ada, welcome!");
    }

    #[test]
    fn test_fill_template_leaves_unknown_and_unclosed_braces() {
        let out = fill_template("{unknown} and {open", &[("name", "x")]);
        assert_eq!(out, "{unknown} and {open");
    }

    #[test]
    fn test_fill_template_does_not_rescan_inserted_values() {
        let out = fill_template("{a}-{b}", &[("a", "{b}"), ("b", "B")]);
        assert_eq!(out, "{b}-B");
    }

    #[test]
    fn test_research_prompt_interpolates_preferences_and_evidence() {
        let prompt = build_stage_prompt(
            Stage::Research,
            &backend_remote(false),
            RESUME,
            Some("### Result 1: Acme"),
            &StageContext::default(),
        );
        assert!(prompt
            .system
            .contains("Find the best remote job opportunities for Backend Engineer positions"));
        assert!(prompt.task.contains("- Work Type: Remote"));
        assert!(prompt.task.contains("- Salary Range: $130,000 - $160,000"));
        assert!(prompt.task.contains("- Experience Level: Senior (5-8 years)"));
        assert!(prompt.task.contains("### Result 1: Acme"));
        assert!(!prompt.task.contains("CONTEXT FROM PREVIOUS STAGES"));
        // The résumé is not part of research.
        assert!(!prompt.task.contains("Jane Doe"));
    }

    #[test]
    fn test_any_arrangement_drops_qualifier_from_goal() {
        let mut prefs = backend_remote(false);
        prefs.work_arrangement = WorkArrangement::Any;
        prefs.experience_level = ExperienceLevel::Any;
        prefs.salary_band = SalaryBand::NotSpecified;
        let prompt =
            build_stage_prompt(Stage::Research, &prefs, RESUME, None, &StageContext::default());
        assert!(prompt
            .system
            .contains("Find the best job opportunities for Backend Engineer positions"));
        assert!(prompt.task.contains("No search results were provided."));
    }

    #[test]
    fn test_gap_analysis_prompt_carries_resume() {
        let prompt = build_stage_prompt(
            Stage::GapAnalysis,
            &backend_remote(false),
            RESUME,
            None,
            &StageContext::default(),
        );
        assert!(prompt.task.contains("Jane Doe"));
        assert!(prompt.system.contains("Senior Technical Recruiter"));
    }

    #[test]
    fn test_topic_with_placeholder_text_is_inserted_literally() {
        let mut prefs = backend_remote(false);
        prefs.topic = "{resume_text} Engineer".to_string();
        let prompt = build_stage_prompt(
            Stage::Compose,
            &prefs,
            RESUME,
            None,
            &StageContext::default(),
        );
        assert!(prompt.task.contains("Target role: {resume_text} Engineer"));
        assert!(!prompt.task.contains("Jane Doe"));
    }
}
