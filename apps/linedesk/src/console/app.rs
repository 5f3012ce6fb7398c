use std::sync::Arc;
use std::time::Duration;

use line_bus::{Bus, BusError, next_event};
use linedesk_sdk::{LineApi, LinedeskClient, SipConfig};
use tracing::{debug, info};

use crate::config::{ClientConfig, parse_server_url};
use crate::console::cli::{
    Cli, Command, ConfirmArgs, DialArgs, HangupArgs, NetworkCommand, RecentsArgs, SipCommand,
    SipSaveArgs, ToneArgs,
};
use crate::console::error::CliError;
use crate::console::prompt::confirmer;
use crate::dialpad::DialPad;
use crate::dispatcher::{ActionDispatcher, Outcome, ToneOutcome};
use crate::recents::RecentsFile;
use crate::session::Session;
use crate::settings::{LineSummary, SipSettingsForm};
use crate::store::LineStore;
use crate::transport::TransportEvent;
use crate::view::{BoardSnapshot, render};

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = ClientConfig::from_env()?;
    config.server_url = parse_server_url(&cli.server)?;
    debug!(target: "linedesk::console", server = %config.server_url, "configuration resolved");

    match cli.command {
        Command::Watch => watch(config).await,
        command => {
            let console = Console::new(config)?;
            console.execute(command).await
        }
    }
}

/// Runs a live session and prints the board every time it changes.
async fn watch(config: ClientConfig) -> Result<(), CliError> {
    let session = Session::start(config).await?;
    let mut board = session.board();
    let mut link = session.transport().bus().subscribe_all();
    print_board(&board.borrow_and_update());

    loop {
        tokio::select! {
            changed = board.changed() => {
                if changed.is_err() {
                    break;
                }
                print_board(&board.borrow_and_update());
            }
            event = next_event(&mut link) => match event {
                Ok(event) => report_link(&event),
                Err(BusError::Lagged(_)) => {}
                Err(BusError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!(target: "linedesk::console", "interrupted");
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

fn print_board(board: &BoardSnapshot) {
    println!("──────────── lines ────────────");
    for view in board.values() {
        println!("{view}");
    }
}

fn report_link(event: &TransportEvent) {
    match event {
        TransportEvent::Connected => println!("🔌 live updates connected"),
        TransportEvent::Disconnected { reason } => {
            println!("⚠️  live updates disconnected: {reason}")
        }
        TransportEvent::ConnectError(err) if err.terminal => println!(
            "❌ live updates unavailable after {} attempts: {}",
            err.attempts, err.reason
        ),
        _ => {}
    }
}

/// One-shot commands against the HTTP API.
struct Console {
    config: ClientConfig,
    api: Arc<LinedeskClient>,
    store: Arc<LineStore>,
    dispatcher: ActionDispatcher,
}

impl Console {
    fn new(config: ClientConfig) -> Result<Self, CliError> {
        let api = Arc::new(LinedeskClient::with_timeout(
            config.server_url.as_str(),
            config.request_timeout,
        )?);
        let store = LineStore::new();
        let recents = match &config.recents_file {
            Some(path) => RecentsFile::new(path),
            None => RecentsFile::default_location()?,
        };
        let dispatcher = ActionDispatcher::new(store.clone(), api.clone(), config.channel_count)
            .with_recents_file(recents);
        Ok(Self {
            config,
            api,
            store,
            dispatcher,
        })
    }

    async fn execute(&self, command: Command) -> Result<(), CliError> {
        match command {
            Command::Watch => Ok(()),
            Command::Lines => self.lines().await,
            Command::Dial(args) => self.dial(args).await,
            Command::Hangup(args) => self.hangup(args).await,
            Command::Channel(args) => {
                self.dispatcher.set_channel(args.line, args.channel).await?;
                println!("✅ Line {} routed to channel {}", args.line, args.channel);
                Ok(())
            }
            Command::Tone(args) => self.tone(args).await,
            Command::Recents(args) => self.recents(args),
            Command::Sip(SipCommand::Show) => self.sip_show().await,
            Command::Sip(SipCommand::Save(args)) => self.sip_save(args).await,
            Command::Network(NetworkCommand::Show) => self.network_show().await,
            Command::Status => self.status().await,
            Command::Restart(ConfirmArgs { yes }) => {
                let outcome = self.dispatcher.restart_service(confirmer(yes).as_ref()).await?;
                report(outcome, "Service is restarting...");
                Ok(())
            }
            Command::Reboot(ConfirmArgs { yes }) => {
                let outcome = self.dispatcher.reboot(confirmer(yes).as_ref()).await?;
                report(outcome, "System is rebooting...");
                Ok(())
            }
        }
    }

    async fn load_lines(&self) -> Result<(), CliError> {
        let lines = self.api.list_lines().await?;
        self.store.load_snapshot(lines);
        Ok(())
    }

    async fn lines(&self) -> Result<(), CliError> {
        self.load_lines().await?;
        for record in self.store.get_all() {
            println!("{}", render(&record));
        }
        Ok(())
    }

    async fn dial(&self, args: DialArgs) -> Result<(), CliError> {
        self.load_lines().await?;
        let mut pad = DialPad::new();
        pad.open(args.line);
        pad.fill(&args.number);
        let (line_id, number) = pad.submit()?;
        let ack = self.dispatcher.dial(line_id, &number).await?;
        println!(
            "📞 Line {line_id}: {} {}",
            ack.status.as_deref().unwrap_or("dialing"),
            ack.phone_number.as_deref().unwrap_or(&number)
        );
        Ok(())
    }

    async fn hangup(&self, args: HangupArgs) -> Result<(), CliError> {
        let outcome = self
            .dispatcher
            .hangup(args.line, confirmer(args.confirm.yes).as_ref())
            .await?;
        report(outcome, &format!("Line {} hung up", args.line));
        Ok(())
    }

    async fn tone(&self, args: ToneArgs) -> Result<(), CliError> {
        if self.dispatcher.start_test_tone(args.channel).await? == ToneOutcome::Started {
            println!("🔊 Test tone on channel {}", args.channel);
        }
        tokio::time::sleep(Duration::from_millis(args.hold_ms)).await;
        self.dispatcher.stop_test_tone().await?;
        println!("🔇 Test tone stopped");
        Ok(())
    }

    fn recents(&self, args: RecentsArgs) -> Result<(), CliError> {
        if args.clear {
            self.dispatcher.clear_recent_numbers();
            println!("Recent numbers cleared");
            return Ok(());
        }
        let numbers = self.dispatcher.recent_numbers();
        if numbers.is_empty() {
            println!("No recent numbers");
        }
        for (index, number) in numbers.iter().enumerate() {
            println!("{:>2}. {number}", index + 1);
        }
        Ok(())
    }

    async fn sip_show(&self) -> Result<(), CliError> {
        let config = self.api.sip_config().await?;
        let form = SipSettingsForm::from_config(&config, self.config.line_count);
        println!(
            "SIP server: {}:{} ({})",
            form.sip_server, form.sip_port, form.transport
        );
        for line_id in self.config.line_ids() {
            match form.line_summary(line_id) {
                LineSummary::Configured(username) => println!("  Line {line_id}: {username}"),
                LineSummary::NotConfigured => println!("  Line {line_id}: Not configured"),
            }
        }
        Ok(())
    }

    async fn sip_save(&self, args: SipSaveArgs) -> Result<(), CliError> {
        let raw = std::fs::read_to_string(&args.file)?;
        let config: SipConfig = serde_json::from_str(&raw).map_err(|err| {
            CliError::InvalidArgument(format!("{}: {err}", args.file.display()))
        })?;
        let form = SipSettingsForm::from_config(&config, self.config.line_count);
        let outcome = self
            .dispatcher
            .save_sip_config(&form, confirmer(args.confirm.yes).as_ref())
            .await?;
        match outcome {
            Outcome::Done(ack) => println!(
                "✅ {}",
                ack.message
                    .as_deref()
                    .unwrap_or("SIP settings saved! System will restart.")
            ),
            Outcome::Cancelled => println!("Cancelled"),
        }
        Ok(())
    }

    async fn network_show(&self) -> Result<(), CliError> {
        let network = self.api.network_config().await?;
        let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
        println!("Mode:        {:?}", network.mode);
        println!("Current IP:  {}", show(&network.current_ip));
        println!("Address:     {}", show(&network.ip_address));
        println!("Subnet mask: {}", show(&network.subnet_mask));
        println!("Gateway:     {}", show(&network.gateway));
        println!("DNS server:  {}", show(&network.dns_server));
        Ok(())
    }

    async fn status(&self) -> Result<(), CliError> {
        let status = self.dispatcher.system_status().await?;
        let show = |value: Option<String>| value.unwrap_or_else(|| "unknown".to_string());
        println!("Status:       {}", show(status.status));
        println!("SIP engine:   {}", show(status.sip_engine));
        println!("Audio router: {}", show(status.audio_router));
        if let Some(registered) = status.lines_registered {
            println!("Registered:   {registered}/{}", self.config.line_count);
        }
        Ok(())
    }
}

fn report(outcome: Outcome, done: &str) {
    match outcome {
        Outcome::Done(()) => println!("✅ {done}"),
        Outcome::Cancelled => println!("Cancelled"),
    }
}
