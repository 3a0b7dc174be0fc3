use crate::parse::extract_json;
use crate::result::{CriteriaVerdict, UnitResult};
use cadre_agent::LlmClient;
use cadre_core::{CadreError, CadreResult};

/// Rewrites delegated output into one answer.
#[derive(Debug, Clone)]
pub struct Summarizer {
    llm: LlmClient,
    instructions: Option<String>,
}

impl Summarizer {
    /// Summarize with `llm`.
    pub fn new(llm: LlmClient) -> Self {
        Self {
            llm,
            instructions: None,
        }
    }

    /// Extra guidance for the summary (tone, format, length).
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// One answer to `task` built from `material`.
    pub async fn summarize(&self, unit: &str, task: &str, material: &str) -> CadreResult<String> {
        let mut system = format!(
            "You are {unit}. Combine your team's work into a single answer to the task. \
             Keep every concrete fact, figure and list item. Do not invent new ones."
        );
        if let Some(extra) = &self.instructions {
            system.push_str("\n\n");
            system.push_str(extra);
        }
        let prompt = format!("## Task\n{task}\n\n## Team output\n{material}");
        self.llm.complete(&system, &prompt).await
    }
}

/// Checks an output against free-text success criteria.
///
/// The verdict is advisory: it is attached to the result and never changes
/// its status.
#[derive(Debug, Clone)]
pub struct CriteriaJudge {
    llm: LlmClient,
}

impl CriteriaJudge {
    /// Judge with `llm`.
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Whether `output` meets `criteria` for `task`.
    pub async fn judge(
        &self,
        criteria: &str,
        task: &str,
        output: &str,
    ) -> CadreResult<CriteriaVerdict> {
        let system = "You review a team's answer against its success criteria. \
                      Reply with JSON only: {\"met\": true|false, \"rationale\": \"<one sentence>\"}";
        let prompt = format!(
            "## Success criteria\n{criteria}\n\n## Task\n{task}\n\n## Answer\n{output}"
        );
        let reply = self.llm.complete(system, &prompt).await?;
        parse_verdict(criteria, &reply)
    }
}

fn parse_verdict(criteria: &str, reply: &str) -> CadreResult<CriteriaVerdict> {
    let value = extract_json(reply)
        .ok_or_else(|| CadreError::Agent(format!("Judge reply is not JSON: {reply}")))?;
    let met = value["met"]
        .as_bool()
        .ok_or_else(|| CadreError::Agent("Judge reply has no boolean \"met\"".into()))?;
    Ok(CriteriaVerdict {
        criteria: criteria.to_string(),
        met,
        rationale: value["rationale"].as_str().unwrap_or_default().to_string(),
    })
}

/// How a coordinator turns its children's results into one output.
#[derive(Debug, Clone, Default)]
pub enum MergeStrategy {
    /// One headed section per child, in plan order, failures marked.
    #[default]
    Concatenate,
    /// Model-written synthesis of the sections.
    Summarize(Summarizer),
}

/// One headed section per entry; failed entries show their failure.
pub(crate) fn concatenate<'a>(sections: impl IntoIterator<Item = Section<'a>>) -> String {
    sections
        .into_iter()
        .map(|section| match section {
            Section::Ran(result) => match result.failure() {
                Some(f) => format!("## {} (failed: {})\n{}", result.unit(), f.kind, f.message),
                None => format!("## {}\n{}", result.unit(), result.output().trim()),
            },
            Section::Skipped { child, reason } => format!("## {child} (skipped)\n{reason}"),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A plan step's contribution to the merged output.
pub(crate) enum Section<'a> {
    Ran(&'a UnitResult),
    Skipped { child: &'a str, reason: &'a str },
}
