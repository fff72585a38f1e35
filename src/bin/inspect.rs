//! voxelstore Inspector Binary
//!
//! Lists, dumps and repairs chunks of a world directory.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use voxelstore::{ChunkPos, Config, LockMode, SessionLock, Tag, WorldFolder, WorldStore};

/// voxelstore Inspector
#[derive(Parser, Debug)]
#[command(name = "voxelstore-inspect")]
#[command(about = "Inspect and repair voxelstore world directories")]
#[command(version)]
struct Args {
    /// World directory
    #[arg(short, long, default_value = "./world")]
    world: PathBuf,

    /// Dimension folder (e.g. DIM-1); the overworld when omitted
    #[arg(short, long, default_value = "")]
    dimension: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List every stored chunk
    Chunks,

    /// Print a chunk's tag tree
    #[command(allow_negative_numbers = true)]
    Dump {
        /// Chunk X coordinate
        x: i32,

        /// Chunk Z coordinate
        z: i32,
    },

    /// List the dimensions of the world
    Dimensions,

    /// Show the session lock holder
    Lock,

    /// Clear unreadable chunks from every region file
    Repair {
        /// Take the lock even if another session holds it
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,voxelstore=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> voxelstore::Result<()> {
    match args.command {
        Commands::Chunks => {
            let mut store = open(&args, LockMode::ReadOnly)?;
            let positions = store.chunk_positions()?;
            for pos in &positions {
                println!("{} {}", pos.x, pos.z);
            }
            println!("{} chunks", positions.len());
        }

        Commands::Dump { x, z } => {
            let mut store = open(&args, LockMode::ReadOnly)?;
            let chunk = store.get_chunk(ChunkPos::new(x, z))?;
            let mut out = String::new();
            write_tag(&mut out, "", &chunk.to_tag(), 0);
            print!("{}", out);
        }

        Commands::Dimensions => {
            for name in WorldFolder::list_dimensions(&args.world)? {
                if name.is_empty() {
                    println!("(overworld)");
                } else {
                    println!("{}", name);
                }
            }
        }

        Commands::Lock => match SessionLock::inspect(&args.world) {
            Ok(Some(info)) => {
                println!("owner:     {:#018x}", info.owner);
                println!("heartbeat: {} ms since epoch", info.heartbeat_ms);
            }
            Ok(None) => println!("lock file is not a valid session lock"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => println!("unlocked"),
            Err(e) => return Err(e.into()),
        },

        Commands::Repair { force } => {
            let mode = if force {
                LockMode::TakeOver
            } else {
                LockMode::Exclusive
            };
            let mut store = open(&args, mode)?;
            let cleared = store.repair()?;
            store.close()?;
            println!("cleared {} chunks", cleared);
        }
    }
    Ok(())
}

fn open(args: &Args, mode: LockMode) -> voxelstore::Result<WorldStore> {
    let config = Config::builder()
        .world_dir(&args.world)
        .dimension(args.dimension.as_str())
        .create(false)
        .lock_mode(mode)
        .build();
    WorldStore::open(config)
}

/// Indented tree, one tag per line; arrays print their length only
fn write_tag(out: &mut String, name: &str, tag: &Tag, depth: usize) {
    let indent = "  ".repeat(depth);
    let label = if name.is_empty() {
        tag.tag_type().name().to_string()
    } else {
        format!("{} ({})", name, tag.tag_type().name())
    };

    match tag {
        Tag::Compound(compound) => {
            out.push_str(&format!("{}{}: {} entries\n", indent, label, compound.len()));
            for (key, child) in compound {
                write_tag(out, key, child, depth + 1);
            }
        }
        Tag::List(list) => {
            out.push_str(&format!(
                "{}{}: {} x {}\n",
                indent,
                label,
                list.len(),
                list.elem_type().name()
            ));
            for (i, child) in list.iter().enumerate() {
                write_tag(out, &format!("[{}]", i), child, depth + 1);
            }
        }
        Tag::ByteArray(v) => out.push_str(&format!("{}{}: [{} bytes]\n", indent, label, v.len())),
        Tag::IntArray(v) => out.push_str(&format!("{}{}: [{} ints]\n", indent, label, v.len())),
        Tag::LongArray(v) => out.push_str(&format!("{}{}: [{} longs]\n", indent, label, v.len())),
        Tag::String(s) => out.push_str(&format!("{}{}: {:?}\n", indent, label, s)),
        Tag::Float(v) => out.push_str(&format!("{}{}: {}\n", indent, label, v)),
        Tag::Double(v) => out.push_str(&format!("{}{}: {}\n", indent, label, v)),
        other => {
            let value = other.as_i64().unwrap_or_default();
            out.push_str(&format!("{}{}: {}\n", indent, label, value));
        }
    }
}
