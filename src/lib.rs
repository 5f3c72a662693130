pub mod cli;
pub mod client;
pub mod config;
pub mod llm;
pub mod models;
pub mod relay;
pub mod server;

use cli::{ ChatArgs, Cli, Command, ServeArgs };
use client::transport::RelayClient;
use client::ChatSession;
use config::prompt::SystemPrompt;
use llm::LlmConfig;
use log::info;
use relay::Relay;
use server::Server;
use std::error::Error;

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error + Send + Sync>> {
    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Chat(args) => chat(args).await,
    }
}

pub async fn serve(args: ServeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Relay Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("adapter default"));
    info!("Chat Base URL: {}", args.chat_base_url.as_deref().unwrap_or("adapter default"));
    info!("System Prompt: {}", args.system_prompt_path.as_deref().unwrap_or("built-in"));
    info!("TLS Enabled: {}", args.enable_tls);
    info!("---------------------------");

    let chat_config = LlmConfig {
        llm_type: args.chat_llm_type.parse()?,
        api_key: Some(args.chat_api_key.clone()).filter(|k| !k.is_empty()),
        completion_model: args.chat_model.clone(),
        base_url: args.chat_base_url.clone(),
    };
    let chat_client = llm::chat::new_client(&chat_config)?;
    info!(
        "Using {} model {} at {}",
        chat_config.llm_type,
        chat_client.get_model(),
        chat_client.get_base_url()
    );
    let system_prompt = SystemPrompt::from_optional_path(args.system_prompt_path.as_deref())?;

    let relay = Relay::new(chat_client, system_prompt);
    info!("System instruction: {} chars", relay.system_prompt().text().chars().count());
    Server::new(relay, &args)?.run().await
}

pub async fn chat(args: ChatArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let transport = RelayClient::new(&args.relay_url)?;
    info!("Chatting with relay at {}", transport.endpoint());

    let mut session = ChatSession::new(transport, args.greeting);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    client::repl::run_repl(&mut session, stdin, &mut stdout).await?;
    Ok(())
}
