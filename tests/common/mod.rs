//! Screen host simulator shared by the integration tests
//!
//! Serves a small menu-driven application over plain TCP. Input is read as
//! lines, function keys and cursor escapes; every handled input is answered
//! with the full current screen.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use greenscreen_core::core::session::LoginScript;
use greenscreen_core::{Credentials, Session, SessionConfig, TelnetConfig, TimingConfig, Transport};

/// Accepted user name
pub const USERNAME: &str = "QATEST";
/// Accepted password
pub const PASSWORD: &str = "Secret42";

/// Width used to turn cursor escapes back into offsets
const WIDTH: usize = 80;

const SIGN_ON: &str = concat!(
    "                             Sign On\n",
    "\n",
    " System . . . . :   SIMHOST\n",
    " Subsystem  . . :   QINTER\n",
    "\n",
    " User . . . . . . :   __________\n",
    " Password . . . . :   __________\n",
    "\n",
);

const MAIN_MENU: &str = concat!(
    "                              MAIN MENU\n",
    "\n",
    " Select one of the following:\n",
    "\n",
    "      1. Business applications\n",
    "      2. Office tasks\n",
    "\n",
    " Selection or command\n",
    " ===> _\n",
    "\n",
    " F3=Exit   F4=Prompt   F12=Cancel\n",
);

const BUSINESS: &str = concat!(
    "                          BUSINESS APPLICATIONS\n",
    "\n",
    " Select one of the following:\n",
    "\n",
    "      1. New Contract Entry\n",
    "      2. Contract Maintenance\n",
    "\n",
    " Selection or command\n",
    " ===> _\n",
    "\n",
    " F3=Exit   F12=Cancel\n",
);

const NEW_CONTRACT: &str = concat!(
    "                          NEW CONTRACT ENTRY\n",
    "\n",
    " Contract Type: ___\n",
    " Policy Number: ___________\n",
    "\n",
    " Last Name  : ____________________\n",
    " First Name : ____________________\n",
    " City       : ____________________\n",
    "\n",
    " F3=Exit   F12=Cancel\n",
);

const BAD_SIGN_ON: &str = "Invalid username or password. Please try again.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    SignOn,
    MainMenu,
    Business,
    NewContract,
}

impl Page {
    fn template(self) -> &'static str {
        match self {
            Self::SignOn => SIGN_ON,
            Self::MainMenu => MAIN_MENU,
            Self::Business => BUSINESS,
            Self::NewContract => NEW_CONTRACT,
        }
    }

    fn back(self) -> Self {
        match self {
            Self::SignOn | Self::MainMenu => Self::SignOn,
            Self::Business => Self::MainMenu,
            Self::NewContract => Self::Business,
        }
    }
}

/// One client's position in the application
struct HostSession {
    page: Page,
    screen: String,
    user: Option<String>,
    cursor: Option<usize>,
}

impl HostSession {
    fn new() -> Self {
        Self {
            page: Page::SignOn,
            screen: SIGN_ON.to_string(),
            user: None,
            cursor: None,
        }
    }

    fn show(&mut self, page: Page) {
        self.page = page;
        self.screen = page.template().to_string();
    }

    fn frame(&self) -> String {
        format!("{}\n", self.screen)
    }

    /// Handle one typed line; returns the reply
    fn line(&mut self, input: &str) -> String {
        if let Some(offset) = self.cursor.take() {
            self.overwrite(offset, input);
            return self.frame();
        }

        let input = input.trim();
        match self.page {
            Page::SignOn => match self.user.take() {
                None => self.user = Some(input.to_string()),
                Some(user) if user == USERNAME && input == PASSWORD => self.show(Page::MainMenu),
                Some(_) => {
                    self.show(Page::SignOn);
                    return format!("{BAD_SIGN_ON}{}", self.frame());
                }
            },
            Page::MainMenu if input == "1" => self.show(Page::Business),
            Page::Business if input == "1" => self.show(Page::NewContract),
            _ => {}
        }
        self.frame()
    }

    /// Handle one escape sequence; returns the reply, if any
    fn escape(&mut self, sequence: &str) -> Option<String> {
        let body = sequence.strip_prefix("\u{1b}[").unwrap_or_default();
        if let Some(position) = body.strip_suffix('H') {
            let (row, col) = position.split_once(';')?;
            let row: usize = row.parse().ok()?;
            let col: usize = col.parse().ok()?;
            self.cursor = Some(row.saturating_sub(1) * WIDTH + col.saturating_sub(1));
            return None;
        }
        match body {
            // F3 and F12
            "13~" | "24~" => {
                let page = self.page.back();
                if page == Page::SignOn {
                    self.user = None;
                }
                self.show(page);
                Some(self.frame())
            }
            _ => None,
        }
    }

    fn overwrite(&mut self, offset: usize, value: &str) {
        let mut bytes = self.screen.clone().into_bytes();
        for (i, b) in value.bytes().enumerate() {
            match bytes.get_mut(offset + i) {
                Some(slot) if *slot != b'\n' => *slot = b,
                _ => break,
            }
        }
        self.screen = String::from_utf8_lossy(&bytes).into_owned();
    }
}

/// Split one complete input unit off the front of `pending`
fn next_input(pending: &mut Vec<u8>) -> Option<Input> {
    if pending.first() == Some(&0x1b) {
        if pending.len() == 1 {
            return None;
        }
        if pending[1] != b'[' {
            pending.remove(0);
            return Some(Input::Escape("\u{1b}".to_string()));
        }
        let end = pending
            .iter()
            .skip(2)
            .position(|b| b.is_ascii_alphabetic() || *b == b'~')?
            + 2;
        let sequence: Vec<u8> = pending.drain(..=end).collect();
        return Some(Input::Escape(String::from_utf8_lossy(&sequence).into_owned()));
    }

    let end = pending.iter().position(|b| *b == b'\n')?;
    let line: Vec<u8> = pending.drain(..=end).collect();
    let line = String::from_utf8_lossy(&line);
    Some(Input::Line(line.trim_end_matches(['\r', '\n']).to_string()))
}

enum Input {
    Line(String),
    Escape(String),
}

async fn serve(mut stream: TcpStream, token: CancellationToken) -> std::io::Result<()> {
    let mut host = HostSession::new();
    stream.write_all(host.frame().as_bytes()).await?;

    let mut pending = Vec::new();
    let mut buffer = [0u8; 1024];
    loop {
        let n = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            read = stream.read(&mut buffer) => read?,
        };
        if n == 0 {
            return Ok(());
        }
        pending.extend_from_slice(&buffer[..n]);

        while let Some(input) = next_input(&mut pending) {
            let reply = match input {
                Input::Line(line) => Some(host.line(&line)),
                Input::Escape(sequence) => host.escape(&sequence),
            };
            if let Some(reply) = reply {
                stream.write_all(reply.as_bytes()).await?;
            }
        }
    }
}

/// Simulated host listening on a loopback port
pub struct Simulator {
    addr: SocketAddr,
    token: CancellationToken,
}

impl Simulator {
    /// Bind an ephemeral port and start serving
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind simulator");
        let addr = listener.local_addr().expect("simulator address");
        let token = CancellationToken::new();

        let accept_token = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_token.cancelled() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        tokio::spawn(serve(stream, accept_token.clone()));
                    }
                }
            }
        });

        Self { addr, token }
    }

    /// Listening port
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Timings short enough for loopback
    pub fn timing() -> TimingConfig {
        TimingConfig {
            text_settle: Duration::from_millis(60),
            key_settle: Duration::from_millis(60),
            function_key_settle: Duration::from_millis(60),
            read_settle: Duration::from_millis(20),
            burst_delay: Duration::from_millis(10),
            poll_interval: Duration::from_millis(20),
            read_buffer: 8192,
        }
    }

    /// Telnet session config pointing at this simulator, signing on with
    /// the given credentials
    pub fn session_config(&self, username: &str, password: &str) -> SessionConfig {
        let telnet = TelnetConfig::new("127.0.0.1")
            .port(self.port())
            .timeout(5)
            .opening_delay(Duration::from_millis(50));

        let mut login = LoginScript::new(Credentials::new(username, password));
        login.sign_on_timeout = Duration::from_secs(2);
        login.main_menu_timeout = Duration::from_millis(800);

        let mut config = SessionConfig::new("simulator", Transport::Telnet(telnet));
        config.login = Some(login);
        config.timing = Self::timing();
        config
    }

    /// Connected, signed-on session
    pub async fn signed_on(&self) -> Session {
        let mut session = Session::new(self.session_config(USERNAME, PASSWORD));
        session.connect().await.expect("sign on");
        session
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
