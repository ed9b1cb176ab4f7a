//! Hostbridge CLI
//!
//!   hostbridge resolve <path> [json]   → Resolve a path against a JSON document
//!                                        (argument, or stdin), output the value
//!   hostbridge replay <file>           → Feed inbound envelopes to a bridge over
//!                                        the scene host, output what it sends
//!   hostbridge serve                   → Run a bridge over the scene host: stdin
//!                                        lines in, outbound batches out on stdout
//!
//! Replay files hold one JSON array of envelopes, or one batch per line.
//!
//! Options:
//!   --config <file>   Bridge config (JSON), env overrides applied on top
//!   --pretty          Pretty-print JSON (default for tty)

use anyhow::{anyhow, bail, Context, Result};
use hostbridge::bridge::envelope::parse_batch;
use hostbridge::logging::init_logging;
use hostbridge::scene::{self, SceneHost};
use hostbridge::{get_path, install_signal_handlers, Bridge, BridgeConfig, Pump, QueueTransport, Value};
use serde_json::{json, Value as JsonValue};
use std::cell::RefCell;
use std::env;
use std::io::{self, BufRead, IsTerminal, Read, Write};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::LocalSet;
use tracing::{debug, error, info};

const MAX_REPLAY_TICKS: u64 = 10_000;

fn main() {
    init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    let opts = match ParsedArgs::parse(&args) {
        Ok(opts) => opts,
        Err(e) => fail(&e, false),
    };

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("hostbridge {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let pretty = opts.pretty || io::stdout().is_terminal();
    let result = match opts.command.as_deref() {
        Some("resolve") => cmd_resolve(&opts),
        Some("replay") => cmd_replay(&opts),
        Some("serve") => cmd_serve(&opts),
        Some(cmd) => Err(anyhow!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    match result.and_then(|output| render(&output, pretty)) {
        Ok(text) => println!("{}", text),
        Err(e) => fail(&e, pretty),
    }
}

fn render(value: &JsonValue, pretty: bool) -> Result<String> {
    let text = if pretty { serde_json::to_string_pretty(value)? } else { serde_json::to_string(value)? };
    Ok(text)
}

fn fail(error: &anyhow::Error, pretty: bool) -> ! {
    let err = json!({ "error": format!("{:#}", error) });
    let text = render(&err, pretty).unwrap_or_else(|_| err.to_string());
    eprintln!("{}", text);
    std::process::exit(1);
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    positional: Vec<String>,
    config: Option<String>,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Result<Self> {
        let mut opts = ParsedArgs::default();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--pretty" => opts.pretty = true,
                "--config" | "-c" => {
                    let path = iter.next().ok_or_else(|| anyhow!("--config needs a file"))?;
                    opts.config = Some(path.clone());
                }
                flag if flag.starts_with("--") => bail!("Unknown option: {}", flag),
                _ if opts.command.is_none() => opts.command = Some(arg.clone()),
                _ => opts.positional.push(arg.clone()),
            }
        }
        Ok(opts)
    }

    fn positional(&self, index: usize, what: &str) -> Result<&str> {
        self.positional
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("Missing {}", what))
    }

    fn bridge_config(&self) -> Result<BridgeConfig> {
        let config = match &self.config {
            Some(path) => BridgeConfig::load(path).with_context(|| format!("loading {}", path))?,
            None => BridgeConfig::default(),
        };
        let config = config.apply_env()?;
        config.validate()?;
        Ok(config)
    }
}

fn scene_bridge(config: BridgeConfig, transport: QueueTransport) -> Bridge {
    let mut bridge = Bridge::new(config, SceneHost::new(), transport);
    scene::install(&mut bridge);
    bridge
}

fn cmd_resolve(opts: &ParsedArgs) -> Result<JsonValue> {
    let path = opts.positional(0, "path")?;
    let text = match opts.positional.get(1) {
        Some(doc) => doc.clone(),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            buf
        }
    };
    let document: JsonValue = serde_json::from_str(&text).context("document is not JSON")?;
    debug!(%path, "resolving");

    let bridge = scene_bridge(opts.bridge_config()?, QueueTransport::default());
    let ctx = bridge.context();
    let value = get_path(&ctx, &Value::wire(document), path)?;
    Ok(ctx.encode(&value)?)
}

fn cmd_replay(opts: &ParsedArgs) -> Result<JsonValue> {
    let file = opts.positional(0, "replay file")?;
    let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file))?;

    let config = opts.bridge_config()?.with_wait_for_peer(false);
    let transport = QueueTransport::new(config.inbound_batch_max);
    for batch in replay_batches(&text) {
        transport.push_inbound(batch)?;
    }

    let mut bridge = scene_bridge(config, transport.clone());
    bridge.start();
    let stats = Pump::run_until_idle(&mut bridge, MAX_REPLAY_TICKS);
    info!(ticks = stats.ticks, dispatched = stats.dispatched, failed = stats.failed, "replay finished");

    let mut envelopes = Vec::new();
    for batch in transport.drain_outbound()? {
        envelopes.extend(parse_batch(&batch)?);
    }
    Ok(JsonValue::Array(envelopes))
}

/// Whole file when it is one JSON document, else one batch per line.
fn replay_batches(text: &str) -> Vec<String> {
    if serde_json::from_str::<JsonValue>(text).is_ok() {
        return vec![text.to_string()];
    }
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn cmd_serve(opts: &ParsedArgs) -> Result<JsonValue> {
    let config = opts.bridge_config()?;
    let interval = config.tick_interval();
    let transport = QueueTransport::new(config.inbound_batch_max);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime")?;
    let local = LocalSet::new();

    let stats = local.block_on(&runtime, async {
        let shutdown = install_signal_handlers();
        let pump_rx = shutdown.subscribe();
        let writer_rx = shutdown.subscribe();

        let stdin_closed = spawn_stdin_reader(transport.clone());
        let on_eof = shutdown.clone();
        tokio::spawn(async move {
            let _ = stdin_closed.await;
            info!("stdin closed");
            on_eof.trigger().await;
        });

        let bridge = Rc::new(RefCell::new(scene_bridge(config, transport.clone())));
        bridge.borrow_mut().start();
        let pump = Pump::spawn_local(bridge.clone(), interval, pump_rx);
        let writer = tokio::task::spawn_local(forward_outbound(transport.clone(), interval, writer_rx));

        let stats = pump.await.context("pump task failed")?;
        writer.await.context("writer task failed")??;
        // The pump's last flush lands after the writer stopped
        write_batches(&transport)?;
        Ok::<_, anyhow::Error>(stats)
    })?;

    info!(ticks = stats.ticks, dispatched = stats.dispatched, failed = stats.failed, "serve finished");
    let stats = serde_json::to_value(stats)?;
    Ok(json!({ "status": "stopped", "stats": stats }))
}

/// Push every non-blank stdin line as one inbound batch. The receiver
/// completes when stdin closes.
fn spawn_stdin_reader(transport: QueueTransport) -> oneshot::Receiver<()> {
    let (closed, rx) = oneshot::channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!(error = %e, "stdin read failed");
                    break;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Err(e) = transport.push_inbound(line) {
                error!(error = %e, "cannot queue inbound batch");
                break;
            }
        }
        let _ = closed.send(());
    });
    rx
}

async fn forward_outbound(
    transport: QueueTransport,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            _ = ticker.tick() => write_batches(&transport)?,
        }
    }
}

/// One outbound batch per stdout line.
fn write_batches(transport: &QueueTransport) -> Result<()> {
    let batches = transport.drain_outbound()?;
    if batches.is_empty() {
        return Ok(());
    }
    let mut out = io::stdout().lock();
    for batch in batches {
        writeln!(out, "{}", batch)?;
    }
    out.flush()?;
    Ok(())
}

fn print_usage() {
    println!(
        r#"hostbridge - path accessors and event bridge

USAGE:
    hostbridge <COMMAND> [OPTIONS]

COMMANDS:
    resolve <path> [json]   Resolve a path against a JSON document (or stdin)
    replay <file>           Replay inbound envelopes against the scene host
    serve                   Run the bridge on stdin/stdout until EOF or a signal

OPTIONS:
    -c, --config <file>     Bridge config file (JSON)
    --pretty                Pretty-print JSON output
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT:
    HOSTBRIDGE_TICK_MS, HOSTBRIDGE_INBOUND_MAX, HOSTBRIDGE_OUTBOUND_MAX,
    HOSTBRIDGE_WAIT_FOR_PEER, HOSTBRIDGE_TITLE   Config overrides
    RUST_LOG, HOSTBRIDGE_LOG=compact|pretty|json Logging

EXAMPLES:
    hostbridge resolve 'items/index:1/name' '{{"items":[{{"name":"a"}},{{"name":"b"}}]}}'
    echo '[1,2,3]' | hostbridge resolve 'index:2'
    hostbridge replay session.jsonl --pretty
    peer | hostbridge serve -c bridge.json | peer"#
    );
}
