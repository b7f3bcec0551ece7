use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use ledmapper::config::{ensure_parent_dir, user_config_path, Config};
use ledmapper::engine::{FixtureUpdate, LedUpdate};
use ledmapper::export::to_json;
use ledmapper::scanner::{ScanPoint, SurfaceBox};
use ledmapper::{
    AspectRatio, ClampMode, Engine, FixedSurface, GeometryError, LayoutExporter, MapStore, ShapeKind, SqliteStore,
};

#[derive(Parser)]
#[command(name = "ledmapper", version, about = "Lay out LED fixtures on a map and export the LED layout")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Map database, overrides the config file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Map to work on, by key (hlm-...) or name; defaults to the only map
    #[arg(long, short, global = true)]
    map: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage maps
    #[command(subcommand)]
    Maps(MapCommand),
    /// Manage fixtures of the selected map
    #[command(subcommand)]
    Fixtures(FixtureCommand),
    /// Place a fixture by clicking on the map surface
    Place(PlaceArgs),
    /// Export the LED layout of the selected map
    Export {
        #[arg(long)]
        clamp: bool,
        #[arg(long)]
        pretty: bool,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Write every map to a JSON backup
    Backup {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Load maps from a JSON backup
    Import {
        file: PathBuf,
        /// Keep existing maps and only add new ones
        #[arg(long)]
        merge: bool,
    },
}

#[derive(Subcommand)]
enum MapCommand {
    List,
    Create { name: String },
    Delete { key: String },
    /// Set the physical size of the selected map
    Resize { width: f64, height: f64 },
    /// Set the aspect ratio of the selected map (1:1, 4:3, 16:10, 16:9)
    Ratio { ratio: String },
}

#[derive(Subcommand)]
enum FixtureCommand {
    List,
    Add { name: String, width: f64, height: f64 },
    Update {
        id: u32,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        width: Option<f64>,
        #[arg(long)]
        height: Option<f64>,
    },
    Delete { id: u32 },
    /// Set the outline: square, circle, star, poly, custom or none
    Shape {
        id: u32,
        kind: String,
        #[arg(long)]
        vertices: Option<u32>,
    },
    /// Set LED count, offset of the first LED and start position
    Leds {
        id: u32,
        #[arg(long)]
        count: Option<u32>,
        #[arg(long, allow_negative_numbers = true)]
        offset: Option<i32>,
        #[arg(long)]
        position: Option<f64>,
    },
}

#[derive(Args)]
struct PlaceArgs {
    id: u32,
    /// Pointer x in surface pixels
    #[arg(long, requires = "y", conflicts_with = "hscan")]
    x: Option<f64>,
    #[arg(long)]
    y: Option<f64>,
    /// Normalized click position instead of pixels
    #[arg(long, requires = "vscan")]
    hscan: Option<f64>,
    #[arg(long)]
    vscan: Option<f64>,
    /// Surface box as left,top,width,height (defaults to the configured surface)
    #[arg(long, value_delimiter = ',')]
    surface: Option<Vec<f64>>,
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(geometry) = e.downcast_ref::<GeometryError>() {
                // The store is untouched; report and move on
                eprintln!("Edit aborted: {}", geometry);
                ExitCode::from(2)
            } else {
                eprintln!("Error: {:#}", e);
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(user_config_path);
    let mut config = Config::load(&config_path)?;
    if let Some(db) = &cli.db {
        config.db_path = Some(db.clone());
    }

    let db_path = config.db_path();
    ensure_parent_dir(&db_path).context("Failed to create config directory")?;
    let mut store = SqliteStore::open(&db_path)?;

    match &cli.command {
        Command::Backup { output } => return write_output(&store.export_to_json()?, output.as_ref()),
        Command::Import { file, merge } => {
            let json = fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
            let written = store.import_from_json(&json, *merge)?;
            println!("Imported {} map(s)", written);
            return Ok(());
        }
        _ => {}
    }

    let mut engine = Engine::new(store, FixedSurface::with_width(config.surface_width, 0.625));

    // Map management works without a selected map
    if let Command::Maps(cmd @ (MapCommand::List | MapCommand::Create { .. } | MapCommand::Delete { .. })) = &cli.command {
        return run_maps(&mut engine, cmd);
    }

    select_map(&mut engine, cli.map.as_deref())?;
    if let Some(map) = engine.active_map()? {
        *engine.surface_mut() = FixedSurface::with_width(config.surface_width, map.aspect_multiplier);
    }

    match &cli.command {
        Command::Maps(cmd) => run_maps(&mut engine, cmd),
        Command::Fixtures(cmd) => run_fixtures(&mut engine, cmd),
        Command::Place(args) => run_place(&mut engine, args),
        Command::Export { clamp, pretty, output } => {
            let clamp = if *clamp { ClampMode::Clamp } else { config.export.clamp };
            let zones = engine.export(&LayoutExporter::new(clamp))?;
            let json = to_json(&zones, *pretty || config.export.pretty)?;
            write_output(&json, output.as_ref())
        }
        Command::Backup { .. } | Command::Import { .. } => Ok(()),
    }
}

type CliEngine = Engine<SqliteStore, FixedSurface>;

fn select_map(engine: &mut CliEngine, requested: Option<&str>) -> Result<()> {
    let selected = match requested {
        Some(name) => {
            let key = if engine.store().is_valid_key(name) { name.to_string() } else { ledmapper::model::map_key(name) };
            engine.select_map(&key)?.then_some(key)
        }
        None => engine.auto_select()?,
    };
    match selected {
        Some(key) => {
            info!("[MAPPER] Active map {}", key);
            Ok(())
        }
        None => bail!("No map selected; pass --map (available: {})", engine.list_maps()?.join(", ")),
    }
}

fn run_maps(engine: &mut CliEngine, cmd: &MapCommand) -> Result<()> {
    match cmd {
        MapCommand::List => {
            for key in engine.list_maps()? {
                println!("{}", key);
            }
        }
        MapCommand::Create { name } => {
            println!("{}", engine.create_map(name)?);
        }
        MapCommand::Delete { key } => {
            if !engine.delete_map(key)? {
                warn!("[MAPPER] No map named {}", key);
            }
        }
        MapCommand::Resize { width, height } => {
            engine.resize_map(*width, *height)?;
        }
        MapCommand::Ratio { ratio } => {
            let Some(ratio) = AspectRatio::from_label(ratio) else {
                bail!("Unknown aspect ratio {}", ratio);
            };
            engine.set_aspect_ratio(ratio)?;
        }
    }
    Ok(())
}

fn run_fixtures(engine: &mut CliEngine, cmd: &FixtureCommand) -> Result<()> {
    let changed = match cmd {
        FixtureCommand::List => {
            for f in engine.fixtures()? {
                println!(
                    "{:>3}  {:<16} {} x {}  at ({}, {})  {}  {} LED(s)",
                    f.id,
                    f.name,
                    f.width,
                    f.height,
                    f.coords.x,
                    f.coords.y,
                    f.shape.name(),
                    f.led_list().len()
                );
            }
            return Ok(());
        }
        FixtureCommand::Add { name, width, height } => {
            let id = engine.add_fixture(name, *width, *height)?;
            if let Some(id) = id {
                println!("{}", id);
            }
            id.is_some()
        }
        FixtureCommand::Update { id, name, width, height } => {
            let update = FixtureUpdate { name: name.clone(), width: *width, height: *height };
            engine.update_fixture(*id, update)?.is_some()
        }
        FixtureCommand::Delete { id } => engine.delete_fixture(*id)?,
        FixtureCommand::Shape { id, kind, vertices } => {
            let shape = ShapeKind::parse(kind, *vertices)?;
            engine.set_shape(*id, shape)?.is_some()
        }
        FixtureCommand::Leds { id, count, offset, position } => {
            let update = LedUpdate { count: *count, offset: *offset, position: *position };
            engine.set_led_params(*id, update)?.is_some()
        }
    };
    if !changed {
        warn!("[MAPPER] Nothing changed");
    }
    Ok(())
}

fn run_place(engine: &mut CliEngine, args: &PlaceArgs) -> Result<()> {
    if engine.select_fixture(Some(args.id))?.is_none() {
        warn!("[MAPPER] No fixture {} on {}", args.id, engine.active_key());
        return Ok(());
    }

    if let Some(surface) = &args.surface {
        let [left, top, width, height] = surface[..] else {
            bail!("--surface needs left,top,width,height");
        };
        engine.surface_mut().0 = SurfaceBox::new(left, top, width, height);
    }

    let placed = match (args.x, args.y, args.hscan, args.vscan) {
        (Some(x), Some(y), _, _) => engine.click(x, y)?,
        (_, _, Some(hscan), Some(vscan)) => engine.place_at(ScanPoint { hscan: hscan.max(0.0), vscan: vscan.max(0.0) })?,
        _ => bail!("Give either --x/--y or --hscan/--vscan"),
    };
    if let Some(p) = placed {
        println!("{} {}", p.x, p.y);
    }
    Ok(())
}

fn write_output(text: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("Failed to write {:?}", path))?;
            info!("[EXPORT] Wrote {:?}", path);
        }
        None => println!("{}", text),
    }
    Ok(())
}
