//! Blocking, expect-style CLI sessions over SSH.
//!
//! Everything here blocks the calling thread, so call from a `spawn_blocking` context.

use regex_lite::Regex;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Read poll interval while waiting for a prompt
const POLL_MS: u32 = 200;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("TCP connection failed: {0}")]
    Connect(String),
    #[error("SSH handshake failed: {0}")]
    Handshake(String),
    #[error("SSH authentication failed: all methods exhausted")]
    Auth,
    #[error("timed out after {}s waiting for {prompt}", .after.as_secs())]
    Timeout { prompt: String, after: Duration },
    #[error("channel error: {0}")]
    Channel(String),
}

/// What a session waits for after sending a line
#[derive(Debug, Clone)]
pub enum Prompt {
    Literal(String),
    Pattern(Regex),
}

impl Prompt {
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// Byte range of the first match in `haystack`
    pub fn find(&self, haystack: &str) -> Option<(usize, usize)> {
        match self {
            Self::Literal(text) => haystack.find(text.as_str()).map(|start| (start, start + text.len())),
            Self::Pattern(re) => re.find(haystack).map(|m| (m.start(), m.end())),
        }
    }
}

impl std::fmt::Display for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(text) => write!(f, "'{}'", text),
            Self::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// A line-oriented interactive shell
pub trait Expect {
    fn send_line(&mut self, line: &str) -> Result<(), SessionError>;

    /// Wait for `prompt` and return everything received before it
    fn expect(&mut self, prompt: &Prompt, timeout: Duration) -> Result<String, SessionError>;

    /// Send a line, wait for the prompt, return the output in between
    fn command(&mut self, line: &str, prompt: &Prompt, timeout: Duration) -> Result<String, SessionError> {
        self.send_line(line)?;
        self.expect(prompt, timeout)
    }
}

/// Algorithm overrides for devices that only speak legacy SSH
#[derive(Debug, Clone, Default)]
pub struct SshOptions {
    pub kex: Option<&'static str>,
    pub host_key: Option<&'static str>,
    pub cipher: Option<&'static str>,
}

impl SshOptions {
    /// The Telco 280 only offers DSA host keys, group1 key exchange and 3DES
    pub fn legacy() -> Self {
        Self {
            kex: Some("diffie-hellman-group1-sha1"),
            host_key: Some("ssh-dss"),
            cipher: Some("3des-cbc"),
        }
    }
}

/// Keyboard-interactive prompt handler that always responds with the password
struct PasswordPrompt {
    password: String,
}

impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.clone()).collect()
    }
}

/// Port 22 of `host`, which may be an address or a DNS name
pub fn ssh_addr(host: &str) -> Result<SocketAddr, SessionError> {
    (host, 22)
        .to_socket_addrs()
        .map_err(|e| SessionError::Connect(format!("Cannot resolve {}: {}", host, e)))?
        .next()
        .ok_or_else(|| SessionError::Connect(format!("{} has no address", host)))
}

/// Create an SSH session and authenticate with password + keyboard-interactive.
pub fn ssh_connect(
    host: &str,
    user: &str,
    pass: &str,
    timeout_secs: u64,
    options: &SshOptions,
) -> Result<ssh2::Session, SessionError> {
    let addr = ssh_addr(host)?;
    let tcp = TcpStream::connect_timeout(&addr, Duration::from_secs(timeout_secs))
        .map_err(|e| SessionError::Connect(e.to_string()))?;

    tcp.set_read_timeout(Some(Duration::from_secs(timeout_secs))).ok();
    tcp.set_write_timeout(Some(Duration::from_secs(timeout_secs))).ok();

    let mut session = ssh2::Session::new()
        .map_err(|e| SessionError::Handshake(format!("Failed to create SSH session: {}", e)))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout_secs as u32 * 1000);

    let prefs = [
        (ssh2::MethodType::Kex, options.kex),
        (ssh2::MethodType::HostKey, options.host_key),
        (ssh2::MethodType::CryptCs, options.cipher),
        (ssh2::MethodType::CryptSc, options.cipher),
    ];
    for (method, pref) in prefs {
        if let Some(pref) = pref {
            session
                .method_pref(method, pref)
                .map_err(|e| SessionError::Handshake(format!("Unsupported algorithm {}: {}", pref, e)))?;
        }
    }

    session
        .handshake()
        .map_err(|e| SessionError::Handshake(e.to_string()))?;

    // Try password auth first
    match session.userauth_password(user, pass) {
        Ok(_) if session.authenticated() => return Ok(session),
        _ => {}
    }

    // Keyboard-interactive is what most network OSes actually offer
    let mut prompter = PasswordPrompt { password: pass.to_string() };
    let _ = session.userauth_keyboard_interactive(user, &mut prompter);

    if session.authenticated() {
        Ok(session)
    } else {
        Err(SessionError::Auth)
    }
}

/// An interactive shell on a PTY
pub struct ShellSession {
    session: ssh2::Session,
    channel: ssh2::Channel,
    buffer: String,
    write_timeout_ms: u32,
}

impl ShellSession {
    pub fn open(
        host: &str,
        user: &str,
        pass: &str,
        timeout_secs: u64,
        options: &SshOptions,
    ) -> Result<Self, SessionError> {
        let session = ssh_connect(host, user, pass, timeout_secs, options)?;

        let mut channel = session
            .channel_session()
            .map_err(|e| SessionError::Channel(format!("Failed to open channel: {}", e)))?;
        channel
            .request_pty("vt100", None, Some((511, 48, 0, 0)))
            .map_err(|e| SessionError::Channel(format!("PTY request failed: {}", e)))?;
        channel
            .shell()
            .map_err(|e| SessionError::Channel(format!("Shell request failed: {}", e)))?;

        tracing::debug!("Opened interactive shell on {}", host);

        Ok(Self {
            session,
            channel,
            buffer: String::new(),
            write_timeout_ms: timeout_secs as u32 * 1000,
        })
    }

    pub fn close(mut self) {
        let _ = self.channel.send_eof();
        let _ = self.channel.close();
        let _ = self.channel.wait_close();
    }
}

impl Expect for ShellSession {
    fn send_line(&mut self, line: &str) -> Result<(), SessionError> {
        self.session.set_timeout(self.write_timeout_ms);
        self.channel
            .write_all(format!("{}\n", line).as_bytes())
            .and_then(|_| self.channel.flush())
            .map_err(|e| SessionError::Channel(format!("Write failed: {}", e)))
    }

    fn expect(&mut self, prompt: &Prompt, timeout: Duration) -> Result<String, SessionError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 4096];
        self.session.set_timeout(POLL_MS);

        loop {
            if let Some((start, end)) = prompt.find(&self.buffer) {
                let before = self.buffer[..start].to_string();
                self.buffer.drain(..end);
                return Ok(before);
            }

            if Instant::now() >= deadline {
                return Err(SessionError::Timeout {
                    prompt: prompt.to_string(),
                    after: timeout,
                });
            }

            match self.channel.read(&mut chunk) {
                Ok(0) if self.channel.eof() => {
                    return Err(SessionError::Channel("Remote closed the session".to_string()))
                }
                Ok(n) => self.buffer.push_str(&String::from_utf8_lossy(&chunk[..n])),
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
                Err(e) => return Err(SessionError::Channel(format!("Read failed: {}", e))),
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted stand-in for a device shell.

    use super::*;
    use std::collections::VecDeque;

    /// Replies are queued per sent line; `expect` searches the accumulated output
    #[derive(Default)]
    pub struct ScriptedShell {
        pub sent: Vec<String>,
        pending: String,
        replies: VecDeque<(String, String)>,
    }

    impl ScriptedShell {
        /// Output shown when the session opens, before any line is sent
        pub fn with_banner(banner: &str) -> Self {
            Self {
                pending: banner.to_string(),
                ..Self::default()
            }
        }

        /// When a line starting with `sent` is written, the device answers `output`
        pub fn reply(mut self, sent: &str, output: &str) -> Self {
            self.replies.push_back((sent.to_string(), output.to_string()));
            self
        }
    }

    impl Expect for ScriptedShell {
        fn send_line(&mut self, line: &str) -> Result<(), SessionError> {
            self.sent.push(line.to_string());
            if let Some((prefix, _)) = self.replies.front() {
                if line.starts_with(prefix.as_str()) {
                    let (_, output) = self.replies.pop_front().unwrap_or_default();
                    self.pending.push_str(&output);
                }
            }
            Ok(())
        }

        fn expect(&mut self, prompt: &Prompt, timeout: Duration) -> Result<String, SessionError> {
            match prompt.find(&self.pending) {
                Some((start, end)) => {
                    let before = self.pending[..start].to_string();
                    self.pending.drain(..end);
                    Ok(before)
                }
                None => Err(SessionError::Timeout {
                    prompt: prompt.to_string(),
                    after: timeout,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedShell;
    use super::*;

    #[test]
    fn test_ssh_addr() {
        assert_eq!(ssh_addr("10.254.3.10").unwrap(), "10.254.3.10:22".parse().unwrap());
        let local = ssh_addr("localhost").unwrap();
        assert!(local.ip().is_loopback());
        assert_eq!(local.port(), 22);
        assert!(matches!(ssh_addr(""), Err(SessionError::Connect(_))));
    }

    #[test]
    fn test_prompt_find() {
        let p = Prompt::literal("STRATUS-1234>");
        assert_eq!(p.find("banner\r\nSTRATUS-1234>"), Some((8, 21)));
        assert_eq!(p.find("STRATUS-12345>"), None);

        let re = Prompt::Pattern(Regex::new(r"(?m)^\S+#\s*$").unwrap());
        assert!(re.find("show run\r\ncore1#").is_some());
        assert!(re.find("core1>").is_none());
    }

    #[test]
    fn test_command_returns_output_before_prompt() {
        let mut shell = ScriptedShell::with_banner("Welcome\r\nH>")
            .reply("show clock", "show clock\r\n12:00:00\r\nH>");
        let prompt = Prompt::literal("H>");

        assert_eq!(shell.expect(&prompt, Duration::from_secs(1)).unwrap(), "Welcome\r\n");
        let out = shell.command("show clock", &prompt, Duration::from_secs(1)).unwrap();
        assert_eq!(out, "show clock\r\n12:00:00\r\n");
        assert_eq!(shell.sent, vec!["show clock".to_string()]);
    }

    #[test]
    fn test_timeout_names_prompt() {
        let mut shell = ScriptedShell::with_banner("Other>");
        let err = shell
            .expect(&Prompt::literal("STRATUS-1>"), Duration::from_secs(10))
            .unwrap_err();
        assert_eq!(err.to_string(), "timed out after 10s waiting for 'STRATUS-1>'");
    }
}
