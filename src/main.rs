//! # ntfy-printer CLI
//!
//! Prints ntfy notifications on a USB receipt printer.
//!
//! ## Usage
//!
//! ```bash
//! # Listen to a topic and print every message
//! ntfy-printer listen --host https://ntfy.sh --topic kitchen
//!
//! # Same, configured from the environment
//! NTFY_HOST=https://ntfy.sh NTFY_TOPIC=kitchen ntfy-printer listen
//!
//! # Render messages to PNG files instead of printing
//! ntfy-printer listen --preview ./previews
//!
//! # Render the example message
//! ntfy-printer example --output lunch.png
//!
//! # Print a calibration grid, then an alignment test
//! ntfy-printer calibrate
//! ntfy-printer test-align
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::error;

use ntfy_printer::{
    ReceiptError,
    agent::{self, Output},
    backpressure::PauseFlag,
    config::{AgentConfig, LayoutArgs, PrinterArgs, StreamArgs},
    logging,
    printer::{PrintOutcome, PrinterConnection},
    render::{
        calibration::{alignment_test, calibration_grid},
        layout::{LayoutConfig, LayoutRenderer},
    },
};

/// Exit status when no stream target is configured.
const EXIT_MISSING_TARGET: u8 = 2;

/// ntfy-printer - Print push notifications on a thermal receipt printer
#[derive(Parser, Debug)]
#[command(name = "ntfy-printer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Listen to an ntfy topic and print each message
    Listen {
        #[command(flatten)]
        stream: StreamArgs,

        #[command(flatten)]
        printer: PrinterArgs,

        #[command(flatten)]
        layout: LayoutArgs,

        /// Render messages to PNG files in this directory instead of printing
        #[arg(long, short = 'p', value_name = "DIR")]
        preview: Option<PathBuf>,
    },

    /// Render an example message to a PNG file
    Example {
        #[command(flatten)]
        layout: LayoutArgs,

        /// Message text
        #[arg(long, default_value = "Lunch Time!")]
        message: String,

        /// Output file
        #[arg(long, short = 'o', value_name = "FILE", default_value = "example.png")]
        output: PathBuf,
    },

    /// Print a calibration grid to find the printable area
    Calibrate {
        #[command(flatten)]
        printer: PrinterArgs,
    },

    /// Print an alignment test receipt
    TestAlign {
        #[command(flatten)]
        printer: PrinterArgs,

        #[command(flatten)]
        layout: LayoutArgs,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_json);

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Exiting");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<ExitCode, ReceiptError> {
    match command {
        Commands::Listen {
            stream,
            printer,
            layout,
            preview,
        } => {
            if stream.target().is_none() {
                error!(
                    "ntfy host/topic not provided. Set NTFY_HOST and NTFY_TOPIC in the environment or pass --host/--topic."
                );
                return Ok(ExitCode::from(EXIT_MISSING_TARGET));
            }
            let config = AgentConfig::from_args(&stream, &printer, &layout)?;
            let output = match preview {
                Some(dir) => Output::Preview(dir),
                None => Output::Printer,
            };
            listen(config, output)?;
        }

        Commands::Example {
            layout,
            message,
            output,
        } => {
            println!("Example message: {}", message);
            let renderer = LayoutRenderer::new(layout.layout_config()?);
            renderer
                .render(&message)
                .save(&output)
                .map_err(|e| ReceiptError::Image(format!("Failed to save PNG: {}", e)))?;
            println!("Saved to {}", output.display());
        }

        Commands::Calibrate { printer } => {
            let profile = printer.profile();
            let options = printer.print_options()?;
            let paper = options.paper;
            let dpi = options.dpi;

            println!("{}", "=".repeat(60));
            println!("CALIBRATION MODE");
            println!("{}", "=".repeat(60));
            println!();
            println!("1. Note the rightmost column letter you can see clearly");
            println!("2. Check whether the heavy center line is centered on the paper");
            println!();
            println!("Current settings:");
            println!("   PAPER_WIDTH_MM={}", paper.paper_width_mm);
            println!("   X_OFFSET_MM={}", paper.x_offset_mm);
            println!("   SAFE_MARGIN_MM={}", paper.safe_margin_mm);
            match paper.max_height_mm {
                Some(mm) => println!("   MAX_HEIGHT_MM={}", mm),
                None => println!("   MAX_HEIGHT_MM=unlimited"),
            }
            println!(
                "   printable width: {}mm ({} dots)",
                paper.printable_width_mm(),
                paper.printable_width_dots(dpi)
            );
            println!("{}", "=".repeat(60));

            let grid = calibration_grid(paper.paper_width_dots(dpi), profile.dots_per_mm());
            let mut connection = agent::printer_connection(
                &profile,
                &options,
                &LayoutConfig::default(),
                PauseFlag::new(),
            );
            expect_printed(connect(&mut connection)?.print_image(&grid))?;

            println!();
            println!("Calibration grid printed!");
            println!("- If the center line is off, adjust X_OFFSET_MM (negative=left, positive=right)");
            println!("- If the right edge is cut off, increase SAFE_MARGIN_MM");
            println!("- To limit receipt length, set MAX_HEIGHT_MM");
        }

        Commands::TestAlign { printer, layout } => {
            let profile = printer.profile();
            let options = printer.print_options()?;
            let paper = options.paper;
            let image = alignment_test(
                paper.paper_width_dots(options.dpi),
                paper.safe_margin_dots(options.dpi),
            );

            let mut connection = agent::printer_connection(
                &profile,
                &options,
                &layout.layout_config()?,
                PauseFlag::new(),
            );
            let connection = connect(&mut connection)?;
            expect_printed(connection.print("ALIGNMENT TEST"))?;
            expect_printed(connection.print_image(&image))?;
            println!("Alignment test printed!");
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Run the listener until SIGINT/SIGTERM.
fn listen(config: AgentConfig, output: Output) -> Result<(), ReceiptError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            agent::shutdown_signal().await;
            trigger.cancel();
        });
        agent::run(config, output, cancel).await
    })
}

fn connect(connection: &mut PrinterConnection) -> Result<&mut PrinterConnection, ReceiptError> {
    if connection.connect() {
        Ok(connection)
    } else {
        Err(ReceiptError::Device(
            "Could not open the printer, check USB ids and permissions".to_string(),
        ))
    }
}

fn expect_printed(outcome: PrintOutcome) -> Result<(), ReceiptError> {
    match outcome {
        PrintOutcome::Printed => Ok(()),
        other => Err(ReceiptError::Device(format!("Print did not complete: {:?}", other))),
    }
}
