use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Ok, Result};
use clap::{Parser, Subcommand};
use retouch_client::{take_dictation, ImageUpload, RetouchClient};

/// Edit photos by telling a retouch server what to do
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// URL of the server
    #[arg(long, default_value = "http://localhost:5000", global = true)]
    server: String,
    #[command(subcommand)]
    task: Task,
}

#[derive(Subcommand, Debug)]
enum Task {
    /// Apply a command such as "rotate 90" or "generate a red kite" and save the result
    Edit {
        /// The command, as free text
        command: Vec<String>,
        /// Speak the command instead of typing it
        #[arg(short, long)]
        dictation: bool,
        /// Whisper model used for dictation
        #[arg(long, default_value = "models/ggml-small.bin")]
        whisper_model: PathBuf,
        /// The image to edit
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// Where to write the resulting PNG
        #[arg(short, long, default_value = "edited.png")]
        output: PathBuf,
        /// Dry run mode: show how keyword matching reads the command, without contacting the server
        #[arg(long)]
        dry: bool,
    },
    /// Keep a file in the server's storage
    Upload {
        path: PathBuf,
    },
    /// List the files in the server's storage
    List,
    /// Fetch a stored file
    Download {
        name: String,
        /// Where to write it; defaults to the stored name
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn read_upload(path: &Path) -> Result<ImageUpload> {
    let content = std::fs::read(path).with_context(|| format!("Reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
    Ok(ImageUpload { file_name, content })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let client = RetouchClient::new(&args.server);

    match args.task {
        Task::Edit {
            command,
            dictation,
            whisper_model,
            image,
            output,
            dry,
        } => {
            let command = if dictation {
                println!("Dictation mode enabled, speak your command");
                take_dictation(&whisper_model).await?
            } else {
                command.join(" ")
            };
            ensure!(!command.trim().is_empty(), "No command given.");
            println!("Command: {}", command);

            if dry {
                println!("Dry run mode enabled, skipping the server");
                println!("{:#?}", retouch::simple_parse(&command));
                return Ok(());
            }

            let image = image.as_deref().map(read_upload).transpose()?;
            let edited = client.edit(&command, image).await?;
            std::fs::write(&output, &edited)
                .with_context(|| format!("Writing {}", output.display()))?;
            tracing::info!("Edited image written to {}", output.display());
        }
        Task::Upload { path } => {
            let stored = client.upload(read_upload(&path)?).await?;
            println!("Stored as {} ({} bytes)", stored.name, stored.size);
        }
        Task::List => {
            for file in client.list().await? {
                println!("{}\t{}", file.size, file.name);
            }
        }
        Task::Download { name, output } => {
            let bytes = client.download(&name).await?;
            let output = output.unwrap_or_else(|| PathBuf::from(&name));
            std::fs::write(&output, bytes)
                .with_context(|| format!("Writing {}", output.display()))?;
            println!("Saved {}", output.display());
        }
    }

    Ok(())
}
