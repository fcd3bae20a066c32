use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use disasm_lens::canvas::Canvas;
use disasm_lens::config::{self, Args, Config};
use disasm_lens::decoder::CapstoneDecoder;
use disasm_lens::overlay::RowMajor;
use disasm_lens::parser::{self, CodeRegion, GoblinParser};
use disasm_lens::registry::ArchRegistry;
use disasm_lens::session::{InputEvent, Session};
use disasm_lens::Surface;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        },
    ))
    .init();

    let registry = ArchRegistry::supported();
    if args.list_archs {
        println!("{}", registry.listing());
        return Ok(());
    }

    let config = match Config::from_args(&args, &registry) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}\n", e);
            eprint!("{}", config::usage(&registry));
            std::process::exit(1);
        }
    };

    let path = args.input.as_deref().context("no input file given")?;
    let bytes = parser::read_input(path, config.retry, parser::RETRY_INTERVAL)?;
    let region = if args.raw {
        CodeRegion::raw(&bytes)
    } else {
        GoblinParser::new().parse(&bytes)
    };

    if let Some(hint) = region.arch_hint {
        if hint != config.entry.name {
            log::info!("{} declares {}, decoding as {}", path.display(), hint, config.entry.name);
        }
    }

    let entry = config.entry;
    let options = config.decoder;
    let mut session = Session::new(Arc::new(config.settings), move || {
        CapstoneDecoder::open(&entry, options)
    });

    let mut canvas = Canvas::new(1, 1);
    session.populate(true, region.base, region.data, &mut canvas);

    for key in &args.keys {
        if session.input(&InputEvent::digital(key)) {
            session.populate(false, region.base, region.data, &mut canvas);
        } else {
            log::warn!("input {} not handled", key);
        }
    }

    println!("{}", canvas.render(args.emit)?);

    if let Some(zoom) = args.zoom {
        let (w, h) = args.overlay_size;
        let mut overlay = Canvas::new(w, h);
        if !session.paint_overlay(zoom, &RowMajor::new(args.row_width), &mut overlay) {
            log::warn!("session inactive, no overlay painted");
        }

        match &args.overlay_out {
            Some(out) => {
                let file = File::create(out)
                    .with_context(|| format!("creating {}", out.display()))?;
                overlay.write_ppm(BufWriter::new(file))?;
                log::info!("overlay written to {}", out.display());
            }
            None => log::info!(
                "overlay {}x{}: {} pixels painted",
                overlay.width(),
                overlay.height(),
                overlay.count_not(disasm_lens::Rgba::TRANSPARENT)
            ),
        }
    }

    Ok(())
}
