//! Command line entry point: wires a source, a deframer, the converter
//! and a sink according to the selected input/output modes.

use clap::Parser;
use log::error;

use hasconv::convert::{self, Format, SsrConverter};
use hasconv::deframe::binex::BinexDeframer;
use hasconv::deframe::nov::NovDeframer;
use hasconv::deframe::sbf::SbfDeframer;
use hasconv::deframe::Deframer;
use hasconv::sink::{FileSink, Output, PppWizSink, TcpSink};
use hasconv::source::ByteSource;

/// Galileo HAS correction decoder: reads C/NAV pages from receiver
/// streams and re-emits the corrections as IGS-SSR or RTCM3-SSR.
#[derive(Parser, Debug)]
#[command(name = "hasconv", version)]
struct Args {
    /// Source stream: file path, "host:port" to listen on, or serial device
    #[arg(short = 's', long)]
    source: String,

    /// Target stream: file path, host, "console" or "localhost"
    #[arg(short = 't', long)]
    target: String,

    /// Output format: 1/IGS or 2/RTCM
    #[arg(short = 'f', long)]
    format: String,

    /// Input mode: 1 SBF file, 2 BINEX file, 3 SBF serial, 4 BINEX
    /// serial, 5 SBF TCP, 6 BINEX TCP, 7 NOV-A file (inferred from the
    /// source when omitted)
    #[arg(short = 'i', long = "modein")]
    mode_in: Option<u8>,

    /// Output mode: 1 TCP, 2 file, 3 PPP-Wiz file, 4 PPP-Wiz stream
    /// (inferred from the target when omitted)
    #[arg(short = 'o', long = "modeout")]
    mode_out: Option<u8>,

    /// TCP output port
    #[arg(short = 'p', long, default_value_t = 6947)]
    port: u16,

    /// Serial input baud rate
    #[arg(short = 'b', long, default_value_t = 115_200)]
    baud: u32,

    /// Process at most this many records (0 = unlimited)
    #[arg(short = 'x', long = "msgnum", default_value_t = 0)]
    msgnum: u64,

    /// Verbosity level 0..6
    #[arg(short = 'v', long, default_value_t = 0)]
    verbose: usize,

    /// Mute non-verbose messages
    #[arg(short = 'm', long)]
    mute: bool,

    /// Skip an initial fraction (0.0..1.0) of a file source
    #[arg(long, default_value_t = 0.0)]
    skip: f64,
}

fn fail(msg: &str) -> ! {
    error!("{}", msg);
    eprintln!("Error: {}", msg);
    std::process::exit(1);
}

/// Guess the input mode from the source string: addresses mean an SBF
/// TCP stream, known file extensions their file readers
fn infer_mode_in(source: &str) -> Option<u8> {
    let lower = source.to_lowercase();
    let numeric = !source.is_empty()
        && source
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ':');
    if numeric || lower.contains("localhost") {
        return Some(5);
    }
    if lower.contains(".sbf") {
        return Some(1);
    }
    if lower.contains(".bnx") {
        return Some(2);
    }
    None
}

/// Guess the output mode from the target string
fn infer_mode_out(target: &str) -> u8 {
    let numeric = !target.is_empty()
        && target
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ':');
    if numeric || target == "localhost" {
        1
    } else if target == "console" {
        4
    } else {
        2
    }
}

fn main() {
    let args = Args::parse();

    stderrlog::new()
        .module(module_path!())
        .module("hasconv")
        .quiet(args.mute)
        .verbosity(args.verbose)
        .timestamp(stderrlog::Timestamp::Second)
        .init()
        .expect("logger init");

    let format = match args.format.to_uppercase().as_str() {
        "1" | "IGS" => Format::Igs,
        "2" | "RTCM" | "RTCM3" => Format::Rtcm3,
        other => fail(&format!(
            "output format \"{}\" not recognized; options are [1:IGS, 2:RTCM3]",
            other
        )),
    };

    let mode_in = match args.mode_in.or_else(|| infer_mode_in(&args.source)) {
        Some(m @ 1..=7) => m,
        Some(m) => fail(&format!(
            "input mode {} not recognized; options are 1..7",
            m
        )),
        None => fail(
            "input mode could not be inferred; for serial input pass -i 3 (SBF) or -i 4 (BINEX)",
        ),
    };
    let mode_out = match args.mode_out.unwrap_or_else(|| infer_mode_out(&args.target)) {
        m @ 1..=4 => m,
        m => fail(&format!(
            "output mode {} not recognized; options are [1:TCP, 2:File, 3:PPP-Wiz file, 4:PPP-Wiz stream]",
            m
        )),
    };
    let pppwiz = mode_out == 3 || mode_out == 4;

    let (source, input_desc) = match mode_in {
        1 | 2 | 7 => {
            let kind = match mode_in {
                1 => "SBF",
                2 => "BINEX",
                _ => "Novatel GALCNAVRAWPAGE ASCII",
            };
            let src = ByteSource::file(&args.source, args.skip)
                .unwrap_or_else(|e| fail(&format!("cannot open {}: {}", args.source, e)));
            (src, format!("{} file {}", kind, args.source))
        }
        3 | 4 => {
            let kind = if mode_in == 3 { "SBF" } else { "BINEX" };
            let src = ByteSource::serial(&args.source, args.baud).unwrap_or_else(|e| {
                fail(&format!("cannot open serial port {}: {}", args.source, e))
            });
            (src, format!("serial {} stream on {}", kind, args.source))
        }
        5 | 6 => {
            let kind = if mode_in == 5 { "SBF" } else { "BINEX" };
            let src = ByteSource::tcp_listen(&args.source)
                .unwrap_or_else(|e| fail(&format!("cannot listen on {}: {}", args.source, e)));
            (src, format!("{} TCP stream on {}", kind, args.source))
        }
        _ => unreachable!(),
    };

    let mut deframer: Box<dyn Deframer> = match mode_in {
        1 | 3 | 5 => Box::new(SbfDeframer::new(source, pppwiz)),
        2 | 4 | 6 => Box::new(BinexDeframer::new(source, pppwiz)),
        _ => Box::new(NovDeframer::new(source)),
    };

    let (mut output, output_desc) = match mode_out {
        1 => {
            let sink = TcpSink::bind(&args.target, args.port).unwrap_or_else(|e| {
                fail(&format!(
                    "cannot serve on {}:{}: {}",
                    args.target, args.port, e
                ))
            });
            (
                Output::Plain(Box::new(sink)),
                format!("TCP server on {}:{}", args.target, args.port),
            )
        }
        2 => {
            let sink = FileSink::create(&args.target)
                .unwrap_or_else(|e| fail(&format!("cannot create {}: {}", args.target, e)));
            (
                Output::Plain(Box::new(sink)),
                format!("file named {}", args.target),
            )
        }
        3 => {
            let sink = PppWizSink::file(&args.target)
                .unwrap_or_else(|e| fail(&format!("cannot create {}: {}", args.target, e)));
            (
                Output::PppWiz(sink),
                format!("PPP-Wiz file named {}", args.target),
            )
        }
        _ => (
            Output::PppWiz(PppWizSink::stdout()),
            "PPP-Wiz stream on stdout".to_string(),
        ),
    };

    let converter = SsrConverter::new(format);
    if !args.mute && mode_out != 4 {
        println!(
            "--- Set up converter ---\nReading HAS messages from a {} and converting to {} messages. Output will be written to a {}.",
            input_desc,
            if format == Format::Igs { "IGS" } else { "RTCM3" },
            output_desc
        );
    }

    convert::run(deframer.as_mut(), &converter, &mut output, args.msgnum);
    if let Err(e) = output.close() {
        fail(&format!("closing the output failed: {}", e));
    }
}
