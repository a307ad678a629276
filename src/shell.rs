//! Line-oriented command shell.
//!
//! The shell reads one command per line from any [`AsyncRead`] and writes
//! responses to any [`AsyncWrite`], so the binary drives it with stdin/stdout
//! and tests drive it with in-memory buffers. Command failures are reported as
//! a single line and never end the shell; only I/O errors on the streams do.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;

use crate::archiver::Archiver;
use crate::client::Connector;
use crate::error::{Error, Result, SelectionError};
use crate::session::Session;
use crate::types::{Event, ExportReport};

const HELP: &str = "\
commands:
  login               log in with a bot or user token
  logout              forget the current session
  list                list guilds, or channels of the entered guild
  enter <guild #>     enter a guild from the list
  leave               leave the entered guild
  archive [ch # ...]  archive channels of the entered guild (default all)
  help                show this help
  exit, quit          leave the shell";

/// Reads a secret without echoing it, e.g. [`rpassword::read_password`].
///
/// Runs on a blocking thread.
pub type SecretReader = Arc<dyn Fn() -> std::io::Result<String> + Send + Sync>;

/// Whether the read loop keeps going after a command
enum Flow {
    Continue,
    Exit,
}

/// Interactive shell over a session.
pub struct Shell<R, W> {
    lines: Lines<BufReader<R>>,
    out: W,
    connector: Arc<dyn Connector>,
    archiver: Archiver,
    session: Option<Session>,
    shutdown: CancellationToken,
    secret_reader: Option<SecretReader>,
}

impl<R, W> Shell<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a shell reading commands from `input` and writing to `output`.
    ///
    /// Cancelling `shutdown` aborts a running export and ends [`Shell::run`].
    pub fn new(
        input: R,
        output: W,
        connector: Arc<dyn Connector>,
        archiver: Archiver,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            lines: BufReader::new(input).lines(),
            out: output,
            connector,
            archiver,
            session: None,
            shutdown,
            secret_reader: None,
        }
    }

    /// Read the login token with `reader` instead of from the command input.
    ///
    /// The binary installs a no-echo terminal reader when stdin is a TTY.
    pub fn with_secret_reader(mut self, reader: SecretReader) -> Self {
        self.secret_reader = Some(reader);
        self
    }

    /// The current session, if logged in
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Log in with `token`, replacing any previous session.
    ///
    /// Failures are reported on the output; only output errors are returned.
    pub async fn login(&mut self, token: &str) -> Result<()> {
        match Session::login(self.connector.as_ref(), token).await {
            Ok(session) => {
                write_line(
                    &mut self.out,
                    &format!("logged in as {}", session.user().username),
                )
                .await?;
                self.session = Some(session);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Login failed");
                write_line(&mut self.out, &format!("error while logging in: {e}")).await?;
            }
        }
        Ok(())
    }

    /// Read and dispatch commands until `exit`, end of input, or shutdown.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let prompt = self.prompt();
            write_prompt(&mut self.out, &prompt).await?;

            let Some(line) = self.read_line().await? else {
                break;
            };
            if let Flow::Exit = self.dispatch(&line).await? {
                break;
            }
        }
        self.out.flush().await?;
        Ok(())
    }

    fn prompt(&self) -> String {
        match &self.session {
            None => "> ".to_string(),
            Some(session) => match session.scope() {
                None => format!("{}> ", session.user().username),
                Some(guild) => format!("{}/{}> ", session.user().username, guild.name),
            },
        }
    }

    /// Next input line; `None` at end of input or on shutdown
    async fn read_line(&mut self) -> Result<Option<String>> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Ok(None),
            line = self.lines.next_line() => Ok(line?),
        }
    }

    async fn dispatch(&mut self, line: &str) -> Result<Flow> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(Flow::Continue);
        };
        let args: Vec<&str> = words.collect();

        match command {
            "login" => self.cmd_login().await?,
            "logout" => self.cmd_logout().await?,
            "list" => self.cmd_list().await?,
            "enter" => self.cmd_enter(&args).await?,
            "leave" => self.cmd_leave().await?,
            "archive" => self.cmd_archive(&args).await?,
            "help" => write_line(&mut self.out, HELP).await?,
            "exit" | "quit" => return Ok(Flow::Exit),
            other => {
                write_line(
                    &mut self.out,
                    &format!("unknown command {other:?}, try help"),
                )
                .await?;
            }
        }
        Ok(Flow::Continue)
    }

    async fn cmd_login(&mut self) -> Result<()> {
        write_prompt(&mut self.out, "Token: ").await?;
        let token = match self.secret_reader.clone() {
            Some(reader) => {
                let read = tokio::task::spawn_blocking(move || reader());
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => None,
                    token = read => Some(token.map_err(std::io::Error::other)??),
                }
            }
            None => self.read_line().await?,
        };
        match token {
            Some(token) => self.login(token.trim()).await,
            None => Ok(()),
        }
    }

    async fn cmd_logout(&mut self) -> Result<()> {
        match self.session.take() {
            Some(session) => {
                tracing::info!(username = %session.user().username, "Logged out");
                write_line(&mut self.out, "logged out").await
            }
            None => write_line(&mut self.out, &Error::NotLoggedIn.to_string()).await,
        }
    }

    async fn cmd_list(&mut self) -> Result<()> {
        let Some(session) = &self.session else {
            return write_line(&mut self.out, &Error::NotLoggedIn.to_string()).await;
        };

        let names = match session.scope() {
            None => session
                .guilds()
                .await
                .map(|guilds| guilds.into_iter().map(|g| g.name).collect::<Vec<_>>())
                .map_err(|e| format!("error getting guilds: {e}")),
            Some(_) => session
                .channels(self.archiver.config().export.text_channels_only)
                .await
                .map(|channels| channels.into_iter().map(|c| c.name).collect::<Vec<_>>())
                .map_err(|e| format!("error getting guild channels: {e}")),
        };

        match names {
            Ok(names) => {
                for (i, name) in names.iter().enumerate() {
                    write_line(&mut self.out, &format!("{i} - {name}")).await?;
                }
                Ok(())
            }
            Err(message) => write_line(&mut self.out, &message).await,
        }
    }

    async fn cmd_enter(&mut self, args: &[&str]) -> Result<()> {
        let Some(session) = &mut self.session else {
            return write_line(&mut self.out, &Error::NotLoggedIn.to_string()).await;
        };
        let [arg] = args else {
            return write_line(
                &mut self.out,
                "invalid number of arguments, should be enter <guild #>",
            )
            .await;
        };

        let message = match session.enter(arg).await {
            Ok(guild) => format!("entered {}", guild.name),
            Err(Error::Selection(SelectionError::NotANumber { .. })) => {
                "invalid guild number, should be enter <guild #>".to_string()
            }
            Err(Error::Selection(SelectionError::OutOfRange { .. })) => {
                "invalid guild number, not within allowed range".to_string()
            }
            Err(e) => format!("error getting guilds: {e}"),
        };
        write_line(&mut self.out, &message).await
    }

    async fn cmd_leave(&mut self) -> Result<()> {
        let Some(session) = &mut self.session else {
            return write_line(&mut self.out, &Error::NotLoggedIn.to_string()).await;
        };
        match session.leave() {
            Some(guild) => write_line(&mut self.out, &format!("left {}", guild.name)).await,
            None => write_line(&mut self.out, &Error::NoGuildScope.to_string()).await,
        }
    }

    async fn cmd_archive(&mut self, args: &[&str]) -> Result<()> {
        match &self.session {
            None => return write_line(&mut self.out, &Error::NotLoggedIn.to_string()).await,
            Some(session) if session.scope().is_none() => {
                return write_line(&mut self.out, &Error::NoGuildScope.to_string()).await;
            }
            Some(_) => {}
        }

        write_prompt(&mut self.out, "Output file (without extension): ").await?;
        let Some(base_name) = self.read_line().await? else {
            return Ok(());
        };
        if base_name.trim().is_empty() {
            return write_line(&mut self.out, "no output file given").await;
        }
        let path = self.archiver.archive_path(&base_name);

        let Some(session) = &self.session else {
            return Ok(());
        };
        let mut events = self.archiver.subscribe();
        let archive = self
            .archiver
            .archive(session, &path, args, &self.shutdown);
        tokio::pin!(archive);

        let result = loop {
            tokio::select! {
                result = &mut archive => break result,
                Ok(event) = events.recv() => write_progress(&mut self.out, &event).await?,
            }
        };
        while let Ok(event) = events.try_recv() {
            write_progress(&mut self.out, &event).await?;
        }

        match result {
            Ok(report) => write_line(&mut self.out, &summary(&report)).await,
            Err(e) => write_line(&mut self.out, &e.to_string()).await,
        }
    }
}

fn summary(report: &ExportReport) -> String {
    format!(
        "wrote {} messages from {} channels to {}",
        report.total_messages(),
        report.channels.len(),
        report.path.display()
    )
}

async fn write_progress<W: AsyncWrite + Unpin>(out: &mut W, event: &Event) -> Result<()> {
    match event {
        Event::ChannelComplete { name, messages, .. } => {
            write_line(out, &format!("  {name}: {messages} messages")).await
        }
        _ => Ok(()),
    }
}

async fn write_prompt<W: AsyncWrite + Unpin>(out: &mut W, prompt: &str) -> Result<()> {
    out.write_all(prompt.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(out: &mut W, line: &str) -> Result<()> {
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    Ok(())
}
