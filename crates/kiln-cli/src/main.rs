//! Kiln CLI - drive a generation backend outside the editor

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{backends, generate, login, upsample};

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Scene-to-image generation toolkit", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an image from a prompt, optionally steered by an input image
    Generate {
        /// Text prompt
        prompt: String,

        /// Input image used as the final-color layer
        #[arg(short, long)]
        input: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = ".kiln/generated")]
        output: String,

        /// Asset name (defaults to a slug of the prompt)
        #[arg(long)]
        name: Option<String>,

        /// Image width when no input image is given
        #[arg(long, default_value = "512")]
        width: u32,

        /// Image height when no input image is given
        #[arg(long, default_value = "512")]
        height: u32,

        /// Generation seed
        #[arg(long)]
        seed: Option<u64>,

        /// Diffusion iterations
        #[arg(long, default_value = "25")]
        iterations: u32,

        /// Input image influence, 0.0 - 1.0
        #[arg(long, default_value = "0.75")]
        strength: f32,

        /// Backend to use (defaults to the configured one)
        #[arg(long)]
        backend: Option<String>,

        /// Model identifier to load
        #[arg(long, default_value = "stable-diffusion-v1-5")]
        model: String,
    },

    /// Upsample a previously saved asset
    Upsample {
        /// Asset name inside the asset directory
        name: String,

        /// Directory the asset was saved to
        #[arg(short, long, default_value = ".kiln/generated")]
        dir: String,

        /// Backend to use (defaults to the configured one)
        #[arg(long)]
        backend: Option<String>,
    },

    /// List available backends
    Backends,

    /// Validate a service token and store it in project config
    Login {
        /// The token to validate
        token: String,

        /// Backend to log into (defaults to the configured one)
        #[arg(long)]
        backend: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            prompt,
            input,
            output,
            name,
            width,
            height,
            seed,
            iterations,
            strength,
            backend,
            model,
        } => generate::run(generate::GenerateArgs {
            prompt,
            input,
            output,
            name,
            width,
            height,
            seed,
            iterations,
            strength,
            backend,
            model,
        }),
        Commands::Upsample { name, dir, backend } => upsample::run(&name, &dir, backend.as_deref()),
        Commands::Backends => backends::run(),
        Commands::Login { token, backend } => login::run(&token, backend.as_deref()),
    }
}
