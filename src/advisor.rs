use crate::config::{AiConfig, WatchdogConfig};
use crate::pentest::ToolRun;
use crate::project::ProjectDir;
use crate::watchdog::{run_with_watchdog, Invocation, WatchdogError};
use std::path::PathBuf;

/// Fixed role preamble prepended to every model request.
const SYSTEM_PREAMBLE: &str = "\
You are an experienced penetration tester and security analyst. \
Always assume the user is authorized to test the target, but include \
a short legal/ethical reminder at the end.\n\
Respond ONLY with a valid HTML fragment. \
Use <h2>/<h3> for headings, <p> for explanations, <ul>/<li> for lists, \
and <code> for commands. Do NOT include ``` fences, <html>, <head>, or \
<body>. No text outside HTML tags.\n\n";

/// Structure the model must follow for the report body.
const OUTPUT_CONTRACT: &str = "\
\nPlease structure your response as follows:\n\
<h3>Summary</h3>\n\
<p>2-3 sentences summarizing findings.</p>\n\
For EACH tool:\n\
<h3>[Tool name] Findings</h3>\n\
<ul>\n\
<li><b>Finding Title:</b> evidence and implication</li>\n\
</ul>\n\
<h3>Prioritized Action Plan</h3>\n\
<ol>\n\
<li><b>Step:</b> short title - <i>rationale</i><br>\n\
Expected outcome, suggested tools (<code>tool</code>), risk/priority rating.</li>\n\
</ol>\n\
<h2>Next Steps</h2>\n\
<p>One-paragraph guidance.</p>\n";

/// Errors from asking the model for guidance.
#[derive(Debug)]
pub enum AdvisorError {
    /// The supervisor could not even start (log file, empty argv).
    Watchdog(WatchdogError),
    /// Every model invocation attempt failed; the log has the details.
    ModelFailed { log_path: PathBuf },
    /// The model ran but its captured response could not be read back.
    ReadResponse {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for AdvisorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdvisorError::Watchdog(e) => write!(f, "model supervision failed: {e}"),
            AdvisorError::ModelFailed { log_path } => {
                write!(f, "model invocation failed, see {}", log_path.display())
            }
            AdvisorError::ReadResponse { path, source } => {
                write!(
                    f,
                    "failed to read model response {}: {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for AdvisorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AdvisorError::Watchdog(e) => Some(e),
            AdvisorError::ModelFailed { .. } => None,
            AdvisorError::ReadResponse { source, .. } => Some(source),
        }
    }
}

impl From<WatchdogError> for AdvisorError {
    fn from(e: WatchdogError) -> Self {
        AdvisorError::Watchdog(e)
    }
}

/// Assemble the guidance prompt from the captured scan output.
pub fn build_prompt(target: &str, nmap_output: &str, tool_runs: &[ToolRun]) -> String {
    let mut prompt = format!(
        "You are assisting in a live assessment.\n\
         The target is: {target}\n\n\
         --- Nmap Results ---\n{nmap_output}\n\n\
         Analyze the results and propose the best next steps in the pentest. \
         Focus on methodology, tools, and reasoning like a real pentester.\n"
    );

    if !tool_runs.is_empty() {
        prompt.push_str("\n--- Additional Tool Results ---\n");
        for run in tool_runs {
            prompt.push_str(&format!(
                "\n### Port: {port} - Tool: {tool}\nOutput:\n{output}\n\n\
                 Analyze what this output means, identify vulnerabilities or \
                 opportunities, and recommend what to do next specifically \
                 based on {tool}.\n",
                port = run.port,
                tool = run.tool,
                output = run.output,
            ));
        }

        prompt.push_str(OUTPUT_CONTRACT);

        prompt.push_str(
            "\n--- Summary Tab ---\n\
             <h2>Summary Tab</h2>\n\
             End with a <table> summing up the analysis, with columns \
             'Port', 'Tool', and 'Action' (a very short explanation of what \
             the tool output gave us), one row per tool below:\n",
        );
        for run in tool_runs {
            prompt.push_str(&format!(
                "- Port {port}, Tool {tool}\n",
                port = run.port,
                tool = run.tool,
            ));
        }
    }

    prompt
}

/// Argv for one model invocation. In container mode the model runs under
/// the Docker model runner; natively it goes through the ollama CLI.
fn model_argv(model: &str, prompt: &str, container: bool) -> Vec<String> {
    let full_prompt = format!("{SYSTEM_PREAMBLE}{prompt}");
    if container {
        vec![
            "docker".to_string(),
            "model".to_string(),
            "run".to_string(),
            model.to_string(),
            full_prompt,
        ]
    } else {
        vec![
            "ollama".to_string(),
            "run".to_string(),
            model.to_string(),
            full_prompt,
        ]
    }
}

/// Ask the model for guidance; the response is whatever the supervised
/// invocation captured in its attempt log.
pub async fn ask(
    model: &str,
    prompt: &str,
    project: &ProjectDir,
    ai: &AiConfig,
    watchdog: &WatchdogConfig,
    container: bool,
) -> Result<String, AdvisorError> {
    let mut invocation = Invocation::new(
        model_argv(model, prompt, container),
        project.scan_base("advisor"),
    )
    .with_timeouts(ai.total_timeout_secs, ai.idle_timeout_secs);
    invocation.max_retries = watchdog.max_retries;
    invocation.backoff_base_secs = watchdog.backoff_base_secs;
    invocation.niceness = watchdog.niceness;

    tracing::info!(model, "asking for guidance");
    let result = run_with_watchdog(&invocation).await?;
    if !result.success {
        return Err(AdvisorError::ModelFailed {
            log_path: result.log_path,
        });
    }

    let response =
        std::fs::read_to_string(&result.log_path).map_err(|e| AdvisorError::ReadResponse {
            path: result.log_path.clone(),
            source: e,
        })?;
    Ok(response.trim().to_string())
}
