//! InkBridge CLI - Command-line interface
//!
//! This binary drives the bridge with the built-in edge-list module and
//! grid layout engine: compile diagram source, render it to SVG, and
//! encode/decode shareable diagram strings.

use clap::{Parser, Subcommand, ValueEnum};
use inkbridge::compute::{pack_artifact, EdgeListCompute, RegistryLoader};
use inkbridge::config::BridgeConfig;
use inkbridge::host::WorkerHandle;
use inkbridge::layout::GridLayoutEngine;
use inkbridge::platform::Platform;
use inkbridge::protocol::{LayoutChoice, RenderOptions};
use std::io::Read;
use std::process;
use std::sync::Arc;

#[derive(Debug, Clone, ValueEnum)]
enum LayoutArg {
    /// Layout embedded in the compute module
    Builtin,
    /// External grid layout engine
    External,
}

#[derive(Parser)]
#[command(name = "inkbridge")]
#[command(about = "Compile and render diagrams through a sandboxed worker", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile diagram source into a diagram document (JSON on stdout)
    Compile {
        /// Source file path, or - for stdin
        input: String,

        /// Layout to use for node placement
        #[arg(long, value_enum)]
        layout: Option<LayoutArg>,

        /// Theme identifier
        #[arg(long, default_value = "0")]
        theme: i64,
    },
    /// Compile diagram source and render it to SVG on stdout
    Render {
        /// Source file path, or - for stdin
        input: String,

        /// Layout to use for node placement
        #[arg(long, value_enum)]
        layout: Option<LayoutArg>,

        /// Theme identifier
        #[arg(long, default_value = "0")]
        theme: i64,

        /// Padding around the diagram in pixels
        #[arg(long, default_value = "100")]
        pad: u32,

        /// Render in hand-sketched style
        #[arg(long)]
        sketch: bool,

        /// Output scale factor (omit for responsive sizing)
        #[arg(long)]
        scale: Option<f64>,
    },
    /// Encode diagram source into a shareable string
    Encode {
        /// Source file path, or - for stdin
        input: String,
    },
    /// Decode a shareable string back into diagram source
    Decode {
        /// The encoded string
        encoded: String,
    },
    /// Print the loaded compute module's version descriptor
    Version,
}

#[tokio::main]
async fn main() {
    inkbridge::logging::init_console_logging();
    let args = Args::parse();

    let platform = Platform::in_runtime(Arc::new(RegistryLoader::with_reference_module()));
    let artifact = pack_artifact(EdgeListCompute::MODULE_NAME, b"");
    let engine = Arc::new(GridLayoutEngine::new());
    let handle = match WorkerHandle::spawn(
        BridgeConfig::default(),
        &platform,
        artifact,
        Some(engine),
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error starting worker: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = handle.ready().await {
        eprintln!("Error initializing worker: {}", e);
        process::exit(1);
    }

    match args.command {
        Command::Compile {
            input,
            layout,
            theme,
        } => {
            let source = read_source(&input);
            let options = RenderOptions {
                layout: layout.map(to_layout_choice),
                theme,
                ..RenderOptions::default()
            };
            match handle.compile_source(&source, options).await {
                Ok(diagram) => println!("{}", diagram),
                Err(e) => {
                    eprintln!("Error compiling diagram: {}", e);
                    process::exit(1);
                }
            }
        }
        Command::Render {
            input,
            layout,
            theme,
            pad,
            sketch,
            scale,
        } => {
            let source = read_source(&input);
            let options = RenderOptions {
                layout: layout.map(to_layout_choice),
                theme,
                pad,
                sketch,
                scale: scale.unwrap_or(-1.0),
                ..RenderOptions::default()
            };
            let diagram = match handle.compile_source(&source, options.clone()).await {
                Ok(diagram) => diagram,
                Err(e) => {
                    eprintln!("Error compiling diagram: {}", e);
                    process::exit(1);
                }
            };
            match handle.render(diagram, options).await {
                Ok(svg) => println!("{}", svg),
                Err(e) => {
                    eprintln!("Error rendering diagram: {}", e);
                    process::exit(1);
                }
            }
        }
        Command::Encode { input } => {
            let source = read_source(&input);
            match handle.encode(&source).await {
                Ok(encoded) => println!("{}", encoded),
                Err(e) => {
                    eprintln!("Error encoding source: {}", e);
                    process::exit(1);
                }
            }
        }
        Command::Decode { encoded } => match handle.decode(&encoded).await {
            Ok(source) => print!("{}", source),
            Err(e) => {
                eprintln!("Error decoding string: {}", e);
                process::exit(1);
            }
        },
        Command::Version => match handle.version().await {
            Ok(descriptor) => println!("{}", descriptor),
            Err(e) => {
                eprintln!("Error querying version: {}", e);
                process::exit(1);
            }
        },
    }

    handle.close();
}

fn to_layout_choice(layout: LayoutArg) -> LayoutChoice {
    match layout {
        LayoutArg::Builtin => LayoutChoice::Builtin,
        LayoutArg::External => LayoutChoice::External,
    }
}

/// Read diagram source from a file path, or stdin when the path is `-`.
fn read_source(input: &str) -> String {
    if input == "-" {
        let mut source = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut source) {
            eprintln!("Error reading stdin: {}", e);
            process::exit(1);
        }
        source
    } else {
        match std::fs::read_to_string(input) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("Error reading {}: {}", input, e);
                process::exit(1);
            }
        }
    }
}
