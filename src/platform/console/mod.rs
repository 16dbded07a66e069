// ABOUTME: Line-oriented console broker that reads chat lines and writes replies as text
// ABOUTME: Bounded inbound/outbound queues with reader, writer, and dispatch pumps

use anyhow::{Context, Result};
use async_trait::async_trait;
use halyard_core::argv;
use halyard_core::config::ConsoleConfig;
use halyard_core::table::utf8_table;
use halyard_core::{Broker, Event, Original, PreferenceStore};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Command that turns a line into a reaction event
pub const REACTION_COMMAND: &str = "reaction";

// =============================================================================
// ConsoleBroker - text stream in, text stream out
// =============================================================================

/// Broker backed by a pair of text streams, one line per inbound message.
///
/// The user and room are fixed at construction. The room name doubles as the
/// broker name, and id/name translation is the identity.
pub struct ConsoleBroker {
    config: ConsoleConfig,
    prefs: Option<Arc<dyn PreferenceStore>>,
    inbound_tx: mpsc::Sender<String>,
    inbound_rx: Mutex<Option<mpsc::Receiver<String>>>,
    outbound_tx: mpsc::Sender<String>,
    outbound_rx: Mutex<Option<mpsc::Receiver<String>>>,
}

impl ConsoleBroker {
    /// Create a broker with both queues sized to `config.queue_capacity`.
    ///
    /// Events it produces carry `prefs` so replies can consult reply-via-dm.
    pub fn new(config: ConsoleConfig, prefs: Option<Arc<dyn PreferenceStore>>) -> Arc<Self> {
        let capacity = config.queue_capacity.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);

        tracing::info!(
            user = %config.user,
            room = %config.room,
            capacity,
            "Console broker created"
        );

        Arc::new(Self {
            config,
            prefs,
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
        })
    }

    /// Reader pump: push each non-empty line from `reader` onto the inbound
    /// queue, waiting while it is full. Returns when the reader hits EOF.
    ///
    /// Lines are split on `\n` with any trailing `\r` removed. Invalid UTF-8
    /// is replaced rather than rejected.
    pub async fn read_lines<R>(&self, mut reader: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .await
                .context("Failed to read from console input")?;
            if n == 0 {
                break;
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
            }
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            if buf.is_empty() {
                continue;
            }
            let line = String::from_utf8_lossy(&buf).into_owned();
            self.inbound_tx
                .send(line)
                .await
                .context("Console inbound queue closed")?;
        }
        tracing::debug!("Console input reached EOF");
        Ok(())
    }

    /// Writer pump: write each outbound text to `writer` verbatim, in order.
    /// Only one writer may run per broker.
    pub async fn write_output<W>(&self, mut writer: W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut rx = take_receiver(&self.outbound_rx, "outbound")?;
        while let Some(text) = rx.recv().await {
            writer
                .write_all(text.as_bytes())
                .await
                .context("Failed to write console output")?;
            writer
                .flush()
                .await
                .context("Failed to flush console output")?;
        }
        Ok(())
    }

    /// Dispatch pump: turn inbound lines into events, in arrival order, and
    /// forward them to `out`. Only one stream may run per broker.
    pub async fn stream(self: Arc<Self>, out: mpsc::Sender<Event>) -> Result<()> {
        let mut rx = take_receiver(&self.inbound_rx, "inbound")?;
        while let Some(line) = rx.recv().await {
            if let Some(evt) = self.dispatch(line).await? {
                out.send(evt)
                    .await
                    .context("Event consumer dropped the receiver")?;
            }
        }
        Ok(())
    }

    /// Build the event for one line. Returns None when the line was handled
    /// here (usage error) or ignored (unknown command).
    async fn dispatch(self: &Arc<Self>, line: String) -> Result<Option<Event>> {
        let mut evt = self.event_for(&line);

        let marker = self.config.command_marker;
        if !line.starts_with(marker) {
            return Ok(Some(evt));
        }

        // The command is the whole first token, marker included
        let reaction = format!("{}{}", marker, REACTION_COMMAND);
        let argv = argv::tokenize(&line);
        match argv.first() {
            Some(command) if *command == reaction => {
                if argv.len() != 2 {
                    evt.reply(format!("{} requires exactly one argument!", reaction))
                        .await?;
                    return Ok(None);
                }
                let name = argv[1].clone();
                tracing::debug!(reaction = %name, "Console reaction");
                evt.body = name.clone();
                evt.original = Original::Reaction(name);
                Ok(Some(evt))
            }
            command => {
                tracing::debug!(
                    command = command.map(String::as_str).unwrap_or(""),
                    "Ignoring unrecognized console command"
                );
                Ok(None)
            }
        }
    }

    fn event_for(self: &Arc<Self>, line: &str) -> Event {
        let broker: Arc<dyn Broker> = self.clone();
        let mut evt = Event::new()
            .with_body(line)
            .with_user(&self.config.user, &self.config.user)
            .with_room(&self.config.room, &self.config.room)
            .with_broker(broker);
        evt.id = uuid::Uuid::new_v4().to_string();
        evt.is_chat = true;
        evt.original = Original::PlainText(line.to_string());
        if let Some(prefs) = &self.prefs {
            evt = evt.with_prefs(Arc::clone(prefs));
        }
        evt
    }

    /// Run the reader and writer pumps on the process's stdin and stdout.
    /// A pump failure is logged and ends the process with status 1.
    pub fn spawn_stdio(self: &Arc<Self>) {
        let reader = Arc::clone(self);
        tokio::spawn(async move {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            if let Err(e) = reader.read_lines(stdin).await {
                tracing::error!(error = %e, "Console input pump failed");
                std::process::exit(1);
            }
        });

        let writer = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = writer.write_output(tokio::io::stdout()).await {
                tracing::error!(error = %e, "Console output pump failed");
                std::process::exit(1);
            }
        });
    }

    async fn enqueue(&self, text: String) -> Result<()> {
        self.outbound_tx
            .send(text)
            .await
            .context("Console outbound queue closed")
    }
}

fn take_receiver<T>(
    slot: &Mutex<Option<mpsc::Receiver<T>>>,
    which: &str,
) -> Result<mpsc::Receiver<T>> {
    slot.lock()
        .map_err(|e| anyhow::anyhow!("Console {} queue mutex poisoned: {}", which, e))?
        .take()
        .ok_or_else(|| anyhow::anyhow!("Console {} queue already has a consumer", which))
}

#[async_trait]
impl Broker for ConsoleBroker {
    fn name(&self) -> &str {
        &self.config.room
    }

    async fn send(&self, evt: Event) -> Result<()> {
        self.enqueue(evt.body).await
    }

    /// There is no separate direct channel, so DMs share the output stream
    async fn send_dm(&self, evt: Event) -> Result<()> {
        self.enqueue(evt.body).await
    }

    async fn send_table(&self, _evt: Event, header: &[String], rows: &[Vec<String>]) -> Result<()> {
        self.enqueue(utf8_table(header, rows)).await
    }

    fn room_id_to_name(&self, id: &str) -> String {
        id.to_string()
    }

    fn room_name_to_id(&self, name: &str) -> String {
        name.to_string()
    }

    fn user_id_to_name(&self, id: &str) -> String {
        id.to_string()
    }

    fn user_name_to_id(&self, name: &str) -> String {
        name.to_string()
    }
}
