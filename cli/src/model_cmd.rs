use clap::Parser;
use kubeassist_core::model_provider::ChatMessage;
use serde_json::json;

use crate::session::Session;

const SYSTEM_PROMPT: &str = "You are a Kubernetes and OpenShift assistant. Answer concisely and \
     prefer concrete kubectl or oc commands when they help.";

#[derive(Debug, Parser)]
pub struct ProvidersArgs {
    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question to send.
    #[arg(value_name = "PROMPT", required = true, num_args = 1..)]
    pub prompt: Vec<String>,
}

impl AskArgs {
    pub fn prompt(&self) -> String {
        self.prompt.join(" ")
    }
}

pub fn run_providers(session: &Session, args: ProvidersArgs) -> anyhow::Result<()> {
    let registry = session.model_factory().registry();
    let selected = session
        .config()
        .model_provider
        .clone()
        .or_else(|| registry.default_provider_id());

    if args.json {
        let entries: Vec<_> = registry
            .iter()
            .map(|(id, descriptor)| {
                json!({
                    "id": id,
                    "kind": descriptor.kind_label(),
                    "model": descriptor.default_model(),
                    "ready": descriptor.is_ready(),
                    "selected": selected.as_deref() == Some(id),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for (id, descriptor) in registry.iter() {
        let marker = if selected.as_deref() == Some(id) { "*" } else { " " };
        let state = if descriptor.is_ready() { "ready" } else { "not configured" };
        println!(
            "{marker} {id:<12} {:<11} {:<24} {state}",
            descriptor.kind_label(),
            descriptor.default_model()
        );
    }
    Ok(())
}

pub async fn run_ask(session: &Session, args: AskArgs) -> anyhow::Result<()> {
    let factory = session.model_factory();
    let model = session.config().model.as_deref();
    let handle = match session.config().model_provider.as_deref() {
        Some(id) => factory.build(id, model)?,
        None => factory.build_default(model)?,
    };
    tracing::info!(provider = handle.provider_id(), model = handle.model(), "asking model");

    let reply = handle
        .chat(&[ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(args.prompt())])
        .await?;
    println!("{}", reply.trim_end());
    Ok(())
}
