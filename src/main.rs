use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use agent_provider::{ToolArguments, ToolResult};
use agent_provider_ollama::{OllamaConfig, OllamaProvider, OllamaStatus};
use anyhow::Context;
use conversation_store::{ConversationStore, FileConversationStore, PendingFunctionCall};
use helix::commands::{parse_slash_command, SlashCommand, HELP_TEXT};
use helix::prompt::{build_system_prompt, load_project_instructions, system_instructions_from_env};
use helix::{
    load_settings, save_settings, Agent, AgentConfig, AgentError, ApprovalGate, BuiltinTools,
    NotificationSink, PermissionRule, Settings, TurnOutcome,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

type InputLines = Lines<BufReader<Stdin>>;

const ARGUMENT_PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Approval {
    Yes,
    No,
    Always,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(error) = helix::logging::init_logging() {
        eprintln!("warning: logging disabled: {error}");
    }

    let cwd = std::env::current_dir().context("failed to resolve the working directory")?;
    // Env overrides apply to this run only; `saved` mirrors the file on disk.
    let mut saved = load_settings(&cwd);
    let settings = saved.clone().with_env_overrides();

    let provider = OllamaProvider::new(
        OllamaConfig::new(settings.model.clone())
            .with_base_url(settings.ollama_base_url.clone())
            .with_num_ctx(settings.context_window_size),
    )
    .context("failed to configure the Ollama provider")?;
    warn_on_status(&provider.check_status().await, &settings.model);

    let registry = BuiltinTools::new(&cwd, settings.shell_dialect)
        .context("failed to open the workspace")?
        .into_registry()?;
    let system_prompt = build_system_prompt(
        &system_instructions_from_env(),
        &registry,
        load_project_instructions(&cwd).as_deref(),
    );

    let store = Arc::new(FileConversationStore::for_workspace(&cwd));
    let agent = Agent::new(
        Arc::new(provider),
        Arc::clone(&store) as Arc<dyn ConversationStore>,
        registry,
        AgentConfig::from_settings(&settings, system_prompt),
    )
    .with_gate(ApprovalGate::new(&settings.permissions, settings.shell_dialect))
    .with_sink(Arc::new(ConsoleSink));

    let profile = agent.provider_profile();
    println!(
        "helix ({} via {}). Type /help for commands.",
        profile.model_id, profile.provider_id
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut conversation_id = new_conversation_id();

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match parse_slash_command(input) {
            Some(SlashCommand::Help) => {
                println!("{HELP_TEXT}");
                continue;
            }
            Some(SlashCommand::Clear) => {
                conversation_id = new_conversation_id();
                println!("Started a new conversation.");
                continue;
            }
            Some(SlashCommand::Quit) => break,
            Some(SlashCommand::Unknown(name)) => {
                println!("Unknown command {name}. Try /help.");
                continue;
            }
            None => {}
        }

        let mut outcome =
            run_turn(&agent, &conversation_id, agent.submit_prompt(&conversation_id, input)).await;
        loop {
            match outcome {
                Ok(TurnOutcome::PermissionRequested { call_ids }) => {
                    let Some(call_id) = call_ids.first() else {
                        break;
                    };
                    let pending = store
                        .load(&conversation_id)
                        .await?
                        .pending_call(call_id)
                        .cloned();
                    let approval = ask_approval(&mut lines, pending.as_ref()).await?;
                    if approval == Approval::Always {
                        if let Some(pending) = &pending {
                            remember_rule(&agent, &mut saved, &cwd, pending);
                        }
                    }
                    let approved = approval != Approval::No;
                    outcome = run_turn(
                        &agent,
                        &conversation_id,
                        agent.resolve_pending_call(&conversation_id, call_id, approved),
                    )
                    .await;
                }
                Ok(_) => break,
                Err(AgentError::ConversationPaused { call_ids, .. }) => {
                    println!("This conversation is still waiting on approval. Resend your message afterwards.");
                    outcome = Ok(TurnOutcome::PermissionRequested { call_ids });
                }
                Err(error) => {
                    eprintln!("error: {error}");
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Awaits a turn; Ctrl-C raises the cancel flag and the turn winds down on its own.
async fn run_turn<F>(agent: &Agent, conversation_id: &str, turn: F) -> Result<TurnOutcome, AgentError>
where
    F: Future<Output = Result<TurnOutcome, AgentError>>,
{
    tokio::pin!(turn);
    loop {
        tokio::select! {
            outcome = &mut turn => return outcome,
            _ = tokio::signal::ctrl_c() => {
                agent.cancel(conversation_id);
            }
        }
    }
}

async fn ask_approval(
    lines: &mut InputLines,
    pending: Option<&PendingFunctionCall>,
) -> anyhow::Result<Approval> {
    if let Some(pending) = pending {
        println!(
            "{} wants to run with {}",
            pending.function_name,
            preview_arguments(&pending.arguments)
        );
    }
    loop {
        print!("Allow? [y]es / [n]o / [a]lways: ");
        let _ = std::io::stdout().flush();
        let Some(answer) = lines.next_line().await.context("failed to read stdin")? else {
            return Ok(Approval::No);
        };
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(Approval::Yes),
            "n" | "no" => return Ok(Approval::No),
            "a" | "always" => return Ok(Approval::Always),
            _ => println!("Please answer y, n or a."),
        }
    }
}

fn remember_rule(agent: &Agent, saved: &mut Settings, cwd: &Path, pending: &PendingFunctionCall) {
    let rule = PermissionRule::always_allow(&pending.to_request());
    agent.add_allow_rule(rule.clone());
    if saved.add_allow_rule(&rule) {
        match save_settings(cwd, saved) {
            Ok(()) => println!("Added allow rule {rule}."),
            Err(error) => eprintln!("warning: could not save allow rule {rule}: {error}"),
        }
    }
}

fn warn_on_status(status: &OllamaStatus, model: &str) {
    if !status.is_running {
        let reason = status.error_message.as_deref().unwrap_or("Ollama is not running");
        eprintln!("warning: {reason}. Start it with `ollama serve`.");
    } else if !status.model_available {
        eprintln!("warning: model {model} is not available. Pull it with `ollama pull {model}`.");
    }
}

fn new_conversation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn preview_arguments(arguments: &ToolArguments) -> String {
    if arguments.is_empty() {
        return "no arguments".to_string();
    }
    arguments
        .iter()
        .map(|(name, value)| format!("{name}={}", preview(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn preview(value: &str) -> String {
    let single_line = value.replace('\n', "\\n");
    if single_line.chars().count() <= ARGUMENT_PREVIEW_CHARS {
        return single_line;
    }
    let mut cut: String = single_line.chars().take(ARGUMENT_PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}

/// Prints turn progress to stdout.
struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn on_text(&self, _conversation_id: &str, content: &str) {
        println!("{content}");
    }

    fn on_tool_invoked(&self, _conversation_id: &str, name: &str, arguments: &ToolArguments) {
        println!("-> {name} ({})", preview_arguments(arguments));
    }

    fn on_tool_result(&self, _conversation_id: &str, result: &ToolResult) {
        if result.is_error {
            let first_line = result.content.lines().next().unwrap_or_default();
            println!("   failed: {}", preview(first_line));
        }
    }

    fn on_completed(&self, _conversation_id: &str, final_message: &str) {
        println!("{final_message}");
    }

    fn on_max_iterations_reached(&self, _conversation_id: &str) {
        println!("Stopped at the iteration limit. Send another message to continue.");
    }

    fn on_cancelled(&self, _conversation_id: &str) {
        println!("Cancelled.");
    }

    fn on_permission_requested(&self, _conversation_id: &str, call: &PendingFunctionCall) {
        println!("Permission needed for {}.", call.function_name);
    }
}
