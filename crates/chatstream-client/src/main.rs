use std::error::Error;
use std::sync::Arc;

use chatstream_client::{
    ChatSession, ClientConfig, HttpTransport, JsonlMessageStore, MessageStore, NoopMessageStore,
    SendInput, TerminalObserver, TranscriptAccumulator,
};
use chatstream_core::observability::{LogDefaults, init_observability};
use clap::Parser;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    init_observability(LogDefaults::CLIENT);

    let config = ClientConfig::parse();
    config.validate()?;

    let context = config.session_context();
    let transport = Arc::new(HttpTransport::new(&config.server_url, config.connect_timeout())?);
    let (store, transcript): (Arc<dyn MessageStore>, TranscriptAccumulator) =
        match &config.history_file {
            Some(path) => {
                let store = JsonlMessageStore::new(path);
                let history = store.load(&context.conversation_id).await?;
                info!(event = "client.history_loaded", domain = "client", messages = history.len() as u64);
                (Arc::new(store), TranscriptAccumulator::from_records(&history))
            }
            None => (Arc::new(NoopMessageStore), TranscriptAccumulator::new()),
        };

    let observer = Arc::new(TerminalObserver::new(std::io::stdout()));
    let mut session = ChatSession::new(context, transport, store, observer)
        .with_limits(config.limits())
        .with_transcript(transcript);

    let abort = session.abort_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    if let Some(input) = config.one_shot_input() {
        session.send(input).await?;
        return Ok(());
    }

    eprintln!(
        "conversation {} (Ctrl-C stops a reply, Ctrl-D quits)",
        session.context().conversation_id
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Err(err) = session.send(SendInput::text(line)).await {
            eprintln!("error: {err}");
        }
    }
    Ok(())
}
