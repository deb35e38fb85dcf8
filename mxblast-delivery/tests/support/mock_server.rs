//! Configurable mock SMTP server for delivery tests.
//!
//! Serves scripted responses for each protocol step, records every
//! command it receives, and can drop the connection mid-transaction to
//! exercise transport-failure handling.
#![allow(dead_code)] // test utility, not every method is used in every test

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

/// A command received by the mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    MessageContent(String),
    Quit,
    Other(String),
}

/// One scripted response.
#[derive(Debug, Clone)]
struct SmtpResponse {
    code: u16,
    message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

/// Multi-line EHLO response.
#[derive(Debug, Clone)]
struct EhloResponse {
    code: u16,
    capabilities: Vec<String>,
}

impl EhloResponse {
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        for (i, capability) in self.capabilities.iter().enumerate() {
            let separator = if i + 1 < self.capabilities.len() {
                '-'
            } else {
                ' '
            };
            out.push_str(&format!("{}{}{}\r\n", self.code, separator, capability));
        }
        out.into_bytes()
    }
}

#[derive(Debug, Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    ehlo: EhloResponse,
    helo: SmtpResponse,
    mail_from: SmtpResponse,
    rcpt_to: SmtpResponse,
    data: SmtpResponse,
    data_end: SmtpResponse,
    quit: SmtpResponse,
    drop_after_commands: Option<usize>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "mock ESMTP ready"),
            ehlo: EhloResponse {
                code: 250,
                capabilities: vec!["mock.localhost".to_string(), "SIZE 10485760".to_string()],
            },
            helo: SmtpResponse::new(250, "mock.localhost"),
            mail_from: SmtpResponse::new(250, "OK"),
            rcpt_to: SmtpResponse::new(250, "OK"),
            data: SmtpResponse::new(354, "start mail input"),
            data_end: SmtpResponse::new(250, "OK: message accepted"),
            quit: SmtpResponse::new(221, "bye"),
            drop_after_commands: None,
        }
    }
}

/// A running mock server bound to an ephemeral local port.
pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<RwLock<Vec<SmtpCommand>>>,
    connections: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            config: MockServerConfig::default(),
        }
    }

    /// Start a server answering success to everything.
    pub async fn accepting() -> std::io::Result<Self> {
        Self::builder().build().await
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The `host:port` string for an MX override entry.
    #[must_use]
    pub fn override_addr(&self) -> String {
        self.addr.to_string()
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands.read().await.clone()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: MockServerConfig,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> std::io::Result<()> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut handled = 0usize;

        writer.write_all(&config.greeting.to_bytes()).await?;
        writer.flush().await?;

        loop {
            if config.drop_after_commands == Some(handled) {
                // Simulated network failure: vanish mid-session
                return Ok(());
            }

            line.clear();
            let Ok(read) = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await
            else {
                return Ok(());
            };
            if read? == 0 {
                return Ok(());
            }
            handled += 1;

            let cmd_line = line.trim().to_string();
            let keyword = cmd_line
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_uppercase();
            let argument = cmd_line
                .split_once(' ')
                .map(|(_, rest)| rest.to_string())
                .unwrap_or_default();

            let (response, command) = match keyword.as_str() {
                "EHLO" => (config.ehlo.to_bytes(), SmtpCommand::Ehlo(argument)),
                "HELO" => (config.helo.to_bytes(), SmtpCommand::Helo(argument)),
                "MAIL" => (config.mail_from.to_bytes(), SmtpCommand::MailFrom(argument)),
                "RCPT" => (config.rcpt_to.to_bytes(), SmtpCommand::RcptTo(argument)),
                "DATA" => (config.data.to_bytes(), SmtpCommand::Data),
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    writer.write_all(&config.quit.to_bytes()).await?;
                    writer.flush().await?;
                    return Ok(());
                }
                _ => (
                    SmtpResponse::new(502, "command not implemented").to_bytes(),
                    SmtpCommand::Other(cmd_line.clone()),
                ),
            };

            let accepted_data = matches!(command, SmtpCommand::Data) && config.data.code == 354;
            commands.write().await.push(command);
            writer.write_all(&response).await?;
            writer.flush().await?;

            if accepted_data {
                let mut content = String::new();
                loop {
                    line.clear();
                    if reader.read_line(&mut line).await? == 0 {
                        return Ok(());
                    }
                    if line.trim_end() == "." {
                        break;
                    }
                    content.push_str(&line);
                }

                commands
                    .write()
                    .await
                    .push(SmtpCommand::MessageContent(content));
                writer.write_all(&config.data_end.to_bytes()).await?;
                writer.flush().await?;
            }
        }
    }
}

/// Builder for a [`MockSmtpServer`].
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_ehlo_response(mut self, code: u16, capabilities: Vec<String>) -> Self {
        self.config.ehlo = EhloResponse { code, capabilities };
        self
    }

    #[must_use]
    pub fn with_helo_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.helo = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub const fn with_network_error_after_commands(mut self, count: usize) -> Self {
        self.config.drop_after_commands = Some(count);
        self
    }

    /// Bind an ephemeral port and start serving.
    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let commands = Arc::new(RwLock::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let config = self.config;
        let commands_task = Arc::clone(&commands);
        let connections_task = Arc::clone(&connections);
        let shutdown_task = Arc::clone(&shutdown);

        tokio::spawn(async move {
            loop {
                if shutdown_task.load(Ordering::Relaxed) {
                    break;
                }

                let accepted = timeout(Duration::from_millis(100), listener.accept()).await;
                if let Ok(Ok((stream, _peer))) = accepted {
                    connections_task.fetch_add(1, Ordering::Relaxed);
                    let config = config.clone();
                    let commands = Arc::clone(&commands_task);

                    tokio::spawn(async move {
                        let _ = MockSmtpServer::handle_client(stream, config, commands).await;
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands,
            connections,
            shutdown,
        })
    }
}
