use std::io::{BufRead, Read, Write};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle, sleep};
use std::time::Duration;
use std::{env, io};

use anyhow::{Context, Result, bail};
use crossterm::style::Stylize;
use tracing_subscriber::EnvFilter;

use serial_pattern_link::ascii::HexBytes;
use serial_pattern_link::mxs::{self, MxsPacketType, Sample};
use serial_pattern_link::{
    Catalog, Diagnostics, Fields, Filter, Link, MessageStream, RecognizedMessage, Trim,
};

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                             Globals
// —————————————————————————————————————————————————————————————————————————————————————————————————

const TIMEOUT: Duration = Duration::from_millis(500);
const READ_BUFFER_SIZE: usize = 2000;
const DEFAULT_BAUD: u32 = 115_200;

#[cfg(unix)]
type PortType = serialport::TTYPort;
#[cfg(windows)]
type PortType = serialport::COMPort;

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Main
// —————————————————————————————————————————————————————————————————————————————————————————————————

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    ctrlc::set_handler(|| {
        println!("\nExiting...\n");
        std::process::exit(0);
    })
    .context("Error setting Ctrl-C handler")?;

    let args: Vec<String> = env::args().collect();
    let input_port = args.get(1).map(|s| s.as_str()).unwrap_or("");
    let baud = match args.get(2) {
        Some(b) => b.parse::<u32>().with_context(|| format!("Invalid baud rate: {b}"))?,
        None => DEFAULT_BAUD,
    };

    let catalog = Arc::new(mxs::catalog().context("Invalid MXS catalog")?);

    println!("\n=== Serial Link Started ===");
    println!("   with MXS message catalog \n");
    println!("Type `help` for commands\n");

    let (main_tx, main_rx) = mpsc::channel::<ThreadMsg>();
    spawn_input_thread(main_tx.clone());

    loop {
        if input_port.is_empty() {
            println!("\nPort not provided. Connecting to largest port number.");
        }
        else {
            println!("\nInput Port");
            println!("==============");
            println!("{input_port}");
        }

        println!("\nAvailable Ports");
        println!("==============");
        if let Ok(ports) = serialport::available_ports() {
            for port in &ports {
                println!("{}", port.port_name);
            }
        }
        else {
            println!("No Ports")
        }
        println!("______________");

        print!("\nSearching for port ...");
        io::stdout().flush()?;

        let port_name = match find_port(input_port) {
            Ok(name) => {
                println!();
                name
            }
            Err(e) => {
                eprintln!("\n{e:#}");
                continue;
            }
        };

        let port = match connect_to_port(&port_name, baud) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("\n{e:#}\n");
                continue;
            }
        };

        if let Err(e) = handle_serial(port, &catalog, &main_tx, &main_rx) {
            eprintln!("\n\nError: {e:#}");
            eprintln!("Disconnected. Retrying Connection...\n");
            continue;
        }
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                            Functions
// —————————————————————————————————————————————————————————————————————————————————————————————————

// ———————————————————————————————————————————— Ports ——————————————————————————————————————————————

fn find_port(input_port: &str) -> Result<String> {
    loop {
        let ports = serialport::available_ports().context("Failed to list ports")?;

        if !input_port.is_empty() {
            if ports.iter().any(|p| p.port_name == input_port) {
                return Ok(input_port.to_string());
            }
        }
        else {
            // Get highest port
            if let Some(port) = ports
                .iter()
                .max_by_key(|p| p.port_name.char_indices().last().unwrap_or((0, '0')).1)
            {
                return Ok(port.port_name.clone());
            }
        }

        print!(".");
        io::stdout().flush()?;
        sleep(Duration::from_secs(1));
    }
}

fn connect_to_port(port_name: &str, baud: u32) -> Result<PortType> {
    print!("Connecting to port: {port_name} @ {baud}");
    io::stdout().flush()?;

    let mut attempt = 0;
    loop {
        match serialport::new(port_name, baud).dtr_on_open(true).timeout(TIMEOUT).open_native() {
            Ok(port) => {
                println!("\n\nConnected!");
                println!("==============\n");
                return Ok(port);
            }
            Err(e) if attempt == 9 => {
                return Err(e).context("Failed after 10 attempts");
            }
            _ => {
                attempt += 1;
                print!(".");
                io::stdout().flush()?;
                sleep(Duration::from_millis(500));
            }
        }
    }
}

// ————————————————————————————————————— Handle Serial Data ————————————————————————————————————————

fn handle_serial(
    port: PortType,
    catalog: &Arc<Catalog>,
    main_tx: &mpsc::Sender<ThreadMsg>,
    main_rx: &mpsc::Receiver<ThreadMsg>,
) -> Result<()> {
    let mut writer = port.try_clone_native().context("Failed to clone port for writing")?;

    let stream = MessageStream::new(catalog.clone(), mxs::config())
        .with_start_predicate(mxs::is_message_start)
        .with_diagnostics(Arc::new(EchoDiagnostics));
    let link = Link::from_stream(stream);

    let tx = main_tx.clone();
    link.subscribe(Filter::All, false, move |msg| {
        let _ = tx.send(ThreadMsg::Message(msg.clone()));
    });

    spawn_reader_thread(port, link.clone(), main_tx.clone());

    loop {
        match main_rx.recv()? {
            ThreadMsg::Print(s) => print!("{s}"),
            ThreadMsg::Error(e) => eprintln!("Thread Error: {e}"),
            ThreadMsg::Message(msg) => print_message(&msg),
            ThreadMsg::Input(line) => {
                if let Err(e) = handle_input(&link, &mut writer, &line) {
                    eprintln!("{} {e:#}", "Error:".red());
                }
            }
            ThreadMsg::Started => println!("\nThread Started"),
            ThreadMsg::Exiting => {
                println!("\nThread Exiting");
                bail!("Reader thread stopped");
            }
        }
    }
}

fn print_message(msg: &RecognizedMessage) {
    let time = msg.received_at.format("%H:%M:%S%.3f").to_string();
    print!("{} {} {}", time.dark_grey(), msg.message_type.as_str().green(), HexBytes(&msg.bytes));

    if msg.message_type == MxsPacketType::Data.name() {
        match msg.value("payload").map(|p| Sample::try_from(p)) {
            Some(Ok(sample)) => print!("  {:?}", sample),
            _ => print!("  {}", "<not a sample>".yellow()),
        }
    }
    println!();
}

// ——————————————————————————————————————————— Commands ————————————————————————————————————————————

fn handle_input(link: &Link, writer: &mut PortType, line: &str) -> Result<()> {
    let mut words = line.split_whitespace();

    match words.next() {
        Some("send") => {
            let name = words.next().context("Usage: send <type> [hex bytes...]")?;
            let payload = words
                .map(|w| u8::from_str_radix(w, 16).with_context(|| format!("Invalid hex byte: {w}")))
                .collect::<Result<Vec<u8>>>()?;

            let fields = if payload.is_empty() {
                Fields::new()
            }
            else {
                mxs::payload_fields(&payload).context("Payload too long")?
            };

            let bytes = link.generate(name, &fields)?;
            writer.write_all(&bytes)?;
            writer.flush()?;
            println!("{} {} {}", ">>:".green(), name.blue(), HexBytes(&bytes));
        }
        Some("buffer") => println!("Buffer: {}", HexBytes(&link.buffer())),
        Some("history") => {
            for msg in link.history() {
                print_message(&msg);
            }
        }
        Some("resync") => {
            link.remove_from_buffer(Trim::All);
            link.reset_sync();
            println!("Buffer cleared, waiting for next marker");
        }
        Some("help") => {
            println!("send <type> [hex bytes...]   types: start end heartbeat data error");
            println!("buffer                       show unmatched bytes");
            println!("history                      show recent messages");
            println!("resync                       drop buffer and wait for a marker");
        }
        Some(other) => bail!("Unknown command: {other}"),
        None => {}
    }
    Ok(())
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                             Threads
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[derive(Debug)]
pub enum ThreadMsg {
    Started,
    Exiting,
    Error(String),
    Print(String),
    Message(RecognizedMessage),
    Input(String),
}

fn spawn_reader_thread(mut port: PortType, link: Link, tx: mpsc::Sender<ThreadMsg>) -> JoinHandle<()> {
    thread::spawn(move || {
        let _ = tx.send(ThreadMsg::Started);

        let mut raw_read = [0u8; READ_BUFFER_SIZE];

        'read: loop {
            match port.read(&mut raw_read) {
                Ok(n) => {
                    link.ingest(&raw_read[..n]);

                    // Nothing can match anymore, resynchronize on the next marker
                    if link.buffer_len() > mxs::MAX_PACKET_SIZE {
                        link.remove_from_buffer(Trim::All);
                        link.reset_sync();
                        let _ = tx.send(ThreadMsg::Print("\n*** Desync, buffer dropped\n".into()));
                    }
                }

                // Timeout > Ignore
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => (),

                // Error > Return
                Err(ref e) => {
                    let _ = tx.send(ThreadMsg::Error(format!("Serial read error: {e:?}")));
                    break 'read;
                }
            };
        }

        let _ = tx.send(ThreadMsg::Exiting);
    })
}

fn spawn_input_thread(tx: mpsc::Sender<ThreadMsg>) -> JoinHandle<()> {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(ThreadMsg::Input(line)).is_err() {
                break;
            }
        }
    })
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                           Diagnostics
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// Bytes outside of packets are the text half of the mixed stream, echo them.
struct EchoDiagnostics;

impl Diagnostics for EchoDiagnostics {
    fn byte_dropped(&self, byte: u8) {
        let mut stdout = io::stdout();
        if byte.is_ascii_graphic() || byte.is_ascii_whitespace() {
            let _ = stdout.write_all(&[byte]);
        }
        else {
            let _ = write!(stdout, "{}", format!("<{byte:02x}>").dark_grey());
        }
        let _ = stdout.flush();
    }
}
