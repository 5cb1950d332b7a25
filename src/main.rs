//! Photo Storage - CLI
//!
//! Command-line front-end standing in for the photo screen.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::{DynamicImage, Rgb, RgbImage};

use photo_storage::{Gallery, Locator, StorageConfig, EXTERNAL_CONTENT_URI};

#[derive(Parser)]
#[command(name = "photo-storage")]
#[command(version = photo_storage::VERSION)]
#[command(about = "Save photos privately or to the shared media index")]
struct Cli {
    /// Storage root
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Config file (defaults to <root>/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Grant write access to shared media regardless of config
    #[arg(long)]
    write_media: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save an image file as a freshly captured photo
    Capture {
        /// Image to use as the camera frame
        image: PathBuf,

        /// Keep the photo in private storage
        #[arg(short, long)]
        private: bool,
    },

    /// List private and shared photos
    List,

    /// Delete a private photo by file name
    Delete {
        /// File name, e.g. 1b4e...jpg
        name: String,
    },

    /// Remove a shared photo, as the platform photo manager would
    RemoveShared {
        /// Media index id
        id: i64,
    },

    /// Re-list shared photos whenever the media index changes
    Watch,

    /// Capture two generated frames, one private and one shared
    Demo,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let root = cli.root.unwrap_or_else(StorageConfig::default_root);
    let config_path = cli.config.unwrap_or_else(|| root.join("config.json"));

    let mut config = StorageConfig::load_or_default(&config_path, &root)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if cli.write_media {
        config.write_media = true;
    }

    let gallery = Arc::new(Gallery::open(&config).context("opening photo stores")?);

    match cli.command {
        Commands::Capture { image, private } => {
            let bitmap = image::open(&image)
                .with_context(|| format!("reading {}", image.display()))?;

            let status = gallery.capture(bitmap, private).await;
            println!("{}", status);
            if !status.is_success() {
                std::process::exit(2);
            }
        }

        Commands::List => {
            gallery.start().await;
            print_lists(&gallery);
        }

        Commands::Delete { name } => {
            let status = gallery.delete_private(&name).await;
            println!("{}", status);
            if !status.is_success() {
                std::process::exit(2);
            }
        }

        Commands::RemoveShared { id } => {
            let locator = Locator::with_appended_id(EXTERNAL_CONTENT_URI, id);
            if gallery.shared().index().delete(&locator)? {
                println!("🗑️ Removed {}", locator);
            } else {
                println!("No shared photo with id {}", id);
            }
        }

        Commands::Watch => {
            let index = Arc::clone(gallery.shared().index());
            let _fs_watch = index.watch_external()?;
            let _watch = gallery.watch(index.register_observer())?;

            if let Some(status) = gallery.on_permissions_changed(None, None).await {
                println!("{}", status);
            }
            print_lists(&gallery);
            println!("👀 Watching {} (Ctrl+C to stop)", config.shared_dir.display());

            let mut seen = gallery.shared_refresh_count();
            let mut ticker = tokio::time::interval(Duration::from_millis(250));
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = ticker.tick() => {
                        let count = gallery.shared_refresh_count();
                        if count != seen {
                            seen = count;
                            print_shared(&gallery);
                        }
                    }
                }
            }
        }

        Commands::Demo => {
            let private = gallery.capture(demo_frame(10, 10), true).await;
            println!("Private: {}", private);

            let shared = gallery.capture(demo_frame(5, 5), false).await;
            println!("Shared:  {}", shared);

            gallery.start().await;
            print_lists(&gallery);
        }
    }

    Ok(())
}

fn demo_frame(width: u32, height: u32) -> DynamicImage {
    let frame = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
    });
    DynamicImage::ImageRgb8(frame)
}

fn print_lists(gallery: &Gallery) {
    let private = gallery.private_photos();
    println!("🔒 Private photos ({}):", private.len());
    for photo in &private {
        let (width, height) = photo.dimensions();
        println!("   {} {}x{}", photo.name, width, height);
    }

    print_shared(gallery);
}

fn print_shared(gallery: &Gallery) {
    let shared = gallery.shared_photos();
    println!("📷 Shared photos ({}):", shared.len());
    for photo in &shared {
        println!(
            "   [{}] {} {}x{} {}",
            photo.id, photo.name, photo.width, photo.height, photo.locator
        );
    }
}
