//! Command line options and their resolution into rendering settings.

use std::path::PathBuf;

use clap::Parser;

use crate::canvas::FrameFormat;
use crate::classify::{Classifier, ColorPolicy};
use crate::decoder::{DecoderOptions, Syntax};
use crate::format::{FormatError, FormatProgram, DEFAULT_FORMAT, DEFAULT_TAB_WIDTH};
use crate::overlay::ZoomRect;
use crate::registry::{ArchEntry, ArchRegistry};
use crate::session::RenderSettings;

/// disasm_lens: colorized disassembly listing with a coverage overlay
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Architecture/mode to disassemble as (see --list-archs)
    #[arg(short, long)]
    pub arch: Option<String>,

    /// Disassembly syntax
    #[arg(short, long, value_enum, default_value_t = Syntax::Att)]
    pub syntax: Syntax,

    /// Coloring mode
    #[arg(short, long, value_enum, default_value_t = ColorPolicy::Simple)]
    pub color: ColorPolicy,

    /// Row format: %p pos, %P rel-pos, %x raw hex, %c opcode, %r operands,
    /// %n linefeed, %t column-align, %% literal percent
    #[arg(short, long, default_value = DEFAULT_FORMAT)]
    pub format: String,

    /// Tab column width in pixels (non-positive values use the default)
    #[arg(short, long, default_value_t = DEFAULT_TAB_WIDTH as i64, allow_negative_numbers = true)]
    pub tab: i64,

    /// Keep retrying until the input can be read
    #[arg(short = 'l', long = "loop")]
    pub retry: bool,

    /// File to visualize
    #[arg(required_unless_present = "list_archs")]
    pub input: Option<PathBuf>,

    /// Print the supported architectures and exit
    #[arg(long)]
    pub list_archs: bool,

    /// Treat the whole input as code instead of looking for an executable section
    #[arg(long)]
    pub raw: bool,

    /// Input events replayed after the first frame (RIGHT, LEFT, TAB)
    #[arg(long, value_delimiter = ',')]
    pub keys: Vec<String>,

    /// Listing surface size in pixels
    #[arg(long, default_value = "256x256", value_parser = parse_size)]
    pub size: (usize, usize),

    /// Frame output format
    #[arg(long, value_enum, default_value_t = FrameFormat::Text)]
    pub emit: FrameFormat,

    /// Zoom rectangle (x0,y0,x1,y1) to paint the coverage overlay for
    #[arg(long, value_parser = parse_zoom)]
    pub zoom: Option<ZoomRect>,

    /// Cells per row of the 2-D view the overlay is aligned with
    #[arg(long, default_value_t = 16)]
    pub row_width: usize,

    /// Overlay surface size in pixels
    #[arg(long, default_value = "256x256", value_parser = parse_size)]
    pub overlay_size: (usize, usize),

    /// Write the overlay as a PPM image
    #[arg(long)]
    pub overlay_out: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Errors found while validating the command line
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no architecture given (-a)")]
    MissingArchitecture,

    #[error("unknown architecture ({0})")]
    UnknownArchitecture(String),

    #[error("invalid format string: {0}")]
    Format(#[from] FormatError),
}

/// Fully resolved startup configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub entry: ArchEntry,
    pub decoder: DecoderOptions,
    pub settings: RenderSettings,
    pub retry: bool,
}

impl Config {
    pub fn from_args(args: &Args, registry: &ArchRegistry) -> Result<Self, ConfigError> {
        let name = args.arch.as_deref().ok_or(ConfigError::MissingArchitecture)?;
        let entry = *registry
            .get(name)
            .ok_or_else(|| ConfigError::UnknownArchitecture(name.to_string()))?;

        let classifier = Classifier::new(args.color);
        let program = FormatProgram::parse(&args.format)?;
        let settings = RenderSettings::new(program, classifier)
            .with_tab_width(tab_width(args.tab))
            .with_surface_size(args.size.0, args.size.1);

        Ok(Self {
            entry,
            decoder: DecoderOptions {
                detail: classifier.needs_detail(),
                syntax: args.syntax,
            },
            settings,
            retry: args.retry,
        })
    }
}

/// Normalise a tab width argument.
pub fn tab_width(value: i64) -> usize {
    if value <= 0 {
        DEFAULT_TAB_WIDTH
    } else {
        value as usize
    }
}

/// Usage text with the list of supported architectures.
pub fn usage(registry: &ArchRegistry) -> String {
    format!(
        "Usage: disasm_lens -a architecture [options] <input>\n\n\
         -a,--arch=    \tspecify architecture/mode (obligatory)\n\
         -s,--syntax=  \tspecify disassembly syntax (opts: intel, at&t)\n\
         -c,--color=   \tset coloring mode (default: simple)\n\
         \tsimple, group, none\n\
         -t,--tab=     \tset tab column width (pixels)\n\
         -l,--loop     \tsleep/retry until the input is readable\n\
         -f,--format=  \toutput format string (default: {})\n\
         \t%p: pos, %P: rel-pos, %x: raw hex %c: opcode, \n\
         \t%r: operands %n: linefeed, %t column-align \n\n\
         Supported architectures:\n{}\n",
        DEFAULT_FORMAT,
        registry.listing()
    )
}

fn parse_size(s: &str) -> Result<(usize, usize), String> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {}", s))?;
    let w = w.trim().parse().map_err(|e| format!("bad width: {}", e))?;
    let h = h.trim().parse().map_err(|e| format!("bad height: {}", e))?;
    Ok((w, h))
}

fn parse_zoom(s: &str) -> Result<ZoomRect, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("bad zoom rectangle {}: {}", s, e))?;

    match parts.as_slice() {
        &[x0, y0, x1, y1] if x1 > x0 && y1 > y0 => Ok(ZoomRect::new(x0, y0, x1, y1)),
        &[_, _, _, _] => Err(format!("zoom rectangle {} is empty", s)),
        _ => Err(format!("expected x0,y0,x1,y1, got {}", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstone::Arch;
    use rstest::rstest;

    fn registry() -> ArchRegistry {
        ArchRegistry::build(|_| true)
    }

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["disasm_lens"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_args(&args(&["-a", "x86-64", "in.bin"]), &registry()).unwrap();

        assert_eq!(config.entry.arch, Arch::X86);
        assert_eq!(config.decoder, DecoderOptions::default());
        assert_eq!(config.settings.tab_width, DEFAULT_TAB_WIDTH);
        assert_eq!(config.settings.program, FormatProgram::default());
        assert_eq!(config.settings.classifier.policy(), ColorPolicy::Simple);
        assert!(!config.retry);
    }

    #[test]
    fn test_group_color_enables_detail() {
        let a = args(&["-a", "arm", "-c", "group", "-s", "intel", "-l", "in.bin"]);
        let config = Config::from_args(&a, &registry()).unwrap();

        assert!(config.decoder.detail);
        assert_eq!(config.decoder.syntax, Syntax::Intel);
        assert!(config.retry);
    }

    #[rstest]
    #[case("120", 120)]
    #[case("0", DEFAULT_TAB_WIDTH)]
    #[case("-5", DEFAULT_TAB_WIDTH)]
    fn test_tab_width(#[case] value: &str, #[case] expected: usize) {
        let config = Config::from_args(&args(&["-a", "x86", "-t", value, "in.bin"]), &registry()).unwrap();

        assert_eq!(config.settings.tab_width, expected);
    }

    #[test]
    fn test_unknown_architecture() {
        let err = Config::from_args(&args(&["-a", "vax", "in.bin"]), &registry()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownArchitecture(ref n) if n == "vax"));

        let err = Config::from_args(&args(&["in.bin"]), &registry()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingArchitecture));
    }

    #[test]
    fn test_bad_format_string() {
        let err = Config::from_args(&args(&["-a", "x86", "-f", "%c%y", "in.bin"]), &registry())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Format(_)));
    }

    #[rstest]
    #[case(&["-a", "x86", "-s", "masm", "in.bin"])]
    #[case(&["-a", "x86", "-c", "rainbow", "in.bin"])]
    #[case(&["-a", "x86"])]
    fn test_rejected_by_parser(#[case] extra: &[&str]) {
        let mut argv = vec!["disasm_lens"];
        argv.extend_from_slice(extra);
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_att_value_name() {
        let a = args(&["-a", "x86", "-s", "at&t", "in.bin"]);
        assert_eq!(a.syntax, Syntax::Att);
    }

    #[test]
    fn test_list_archs_needs_no_input() {
        let a = args(&["--list-archs"]);
        assert!(a.list_archs);
        assert!(a.input.is_none());
    }

    #[test]
    fn test_overlay_options() {
        let a = args(&["-a", "x86", "--zoom", "0,0,16,16", "--overlay-size", "160x160", "--keys", "RIGHT,TAB", "in.bin"]);

        assert_eq!(a.zoom, Some(ZoomRect::new(0, 0, 16, 16)));
        assert_eq!(a.overlay_size, (160, 160));
        assert_eq!(a.keys, vec!["RIGHT", "TAB"]);
        assert!(parse_zoom("4,4,4,8").is_err());
        assert!(parse_zoom("1,2,3").is_err());
        assert!(parse_size("12").is_err());
    }

    #[test]
    fn test_usage_lists_architectures() {
        let text = usage(&registry());
        assert!(text.contains("x86-64"));
        assert!(text.contains("%p: pos"));
    }
}
