use std::io::Write;
use std::sync::Arc;

use anyhow::bail;
use args::{Args, ChatArgs, Command};
use clap::Parser;
use fanout::{ChatEvent, ChatMessage, ChatRequest, GenerationParams, Orchestrator, selection};
use futures::StreamExt;
use secrecy::SecretString;

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init(&args.log);

    let config = Arc::new(config::Config::load(&args.config)?);
    config.validate()?;

    let orchestrator = Orchestrator::new(Arc::clone(&config));

    match args.command {
        Command::Models => models(&orchestrator, &config).await,
        Command::Chat(chat_args) => chat(&orchestrator, &config, chat_args).await,
    }
}

/// Load the registry and settle availability with one probe cycle.
async fn load_and_probe(orchestrator: &Orchestrator, config: &config::Config) -> anyhow::Result<()> {
    if let Err(error) = orchestrator.load_registry().await {
        bail!("{error}. Check the [discovery] configuration and run the command again to retry.");
    }

    if config.health.enabled {
        fanout::run_cycle(orchestrator.registry(), &config.discovery, &config.health).await;
    } else {
        log::debug!("health probing is disabled, availability stays as discovered");
    }

    Ok(())
}

async fn models(orchestrator: &Orchestrator, config: &config::Config) -> anyhow::Result<()> {
    load_and_probe(orchestrator, config).await?;

    let mut models = orchestrator.registry().models();
    models.sort_by(|a, b| {
        (a.priority.unwrap_or(u32::MAX), &a.id).cmp(&(b.priority.unwrap_or(u32::MAX), &b.id))
    });

    println!("{:<24} {:<28} {:<12} {:>10} {:>8}", "ID", "NAME", "CLASS", "CONTEXT", "STATUS");

    for record in models {
        let context = record
            .context_length
            .map(|tokens| tokens.to_string())
            .unwrap_or_else(|| "-".to_string());
        let name = if record.default {
            format!("{} (default)", record.name)
        } else {
            record.name.clone()
        };

        println!(
            "{:<24} {:<28} {:<12} {:>10} {:>8}",
            record.id, name, record.class, context, record.availability
        );
    }

    Ok(())
}

async fn chat(orchestrator: &Orchestrator, config: &config::Config, args: ChatArgs) -> anyhow::Result<()> {
    load_and_probe(orchestrator, config).await?;

    let mut selected = args.models;

    if selected.is_empty() {
        let Some(record) = orchestrator.registry().default_model() else {
            bail!("the registry lists no models");
        };

        log::info!("no model selected, using {}", record.id);
        selected.push(record.id);
    }

    for model_id in selection::prune_offline(&mut selected, orchestrator.registry()) {
        log::warn!("dropping offline model {model_id} from the selection");
    }

    if selected.is_empty() {
        let models = orchestrator.registry().models();

        let Some(record) = selection::gateway_fallback(&models) else {
            bail!("every selected model is offline and no gateway model is available");
        };

        log::warn!("every selected model is offline, falling back to {}", record.id);
        selected.push(record.id.clone());
    }

    let mut messages = Vec::new();

    if let Some(system) = args.system {
        messages.push(ChatMessage::system(system));
    }

    messages.push(ChatMessage::user(args.prompt));

    let mut request = ChatRequest::new(selected, messages);
    request.params = GenerationParams {
        max_tokens: args.max_tokens,
        temperature: args.temperature,
        top_p: args.top_p,
    };
    request.gateway_token = args.gateway_token.map(SecretString::from);

    let cancellation = request.cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("interrupted, cancelling in-flight streams");
            cancellation.cancel();
        }
    });

    let mut stream = orchestrator.stream_chat(request);
    let mut current_model: Option<String> = None;
    let mut failures = 0usize;

    while let Some(event) = stream.next().await {
        match event {
            ChatEvent::Start { model_id } => log::debug!("{model_id} connected"),
            ChatEvent::Token { model_id, content } => {
                if current_model.as_deref() != Some(model_id.as_str()) {
                    if current_model.is_some() {
                        println!();
                    }

                    println!("[{model_id}]");
                    current_model = Some(model_id);
                }

                print!("{content}");
                std::io::stdout().flush().ok();
            }
            ChatEvent::Done { model_id } => log::debug!("{model_id} finished"),
            ChatEvent::Error { model_id, content, .. } => {
                if current_model.take().is_some() {
                    println!();
                }

                let subject = if model_id.is_empty() { "request" } else { model_id.as_str() };
                log::error!("{subject}: {content}");
                failures += 1;
            }
        }
    }

    println!();

    if failures > 0 {
        log::warn!("{failures} model stream(s) failed");
    }

    Ok(())
}
