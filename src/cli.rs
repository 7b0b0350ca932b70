use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::domain::{BaseFormat, DownloadPolicy};

#[derive(Debug, Parser)]
#[command(name = "kira-pdb")]
#[command(about = "Validate PDB identifiers and download structure files from the Protein Data Bank")]
#[command(version, author, disable_help_subcommand = true)]
pub struct Cli {
    /// Print the result as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging unless RUST_LOG is set.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Path to a kira-pdb JSON config file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Directory structure files are written to.
    #[arg(long, global = true)]
    pub output_dir: Option<String>,

    /// Number of parallel transfers.
    #[arg(short = 'j', long, global = true)]
    pub jobs: Option<usize>,

    /// Per-transfer timeout in seconds.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(about = "Display usage")]
    Help,
    #[command(about = "Determine whether the supplied PDB identifiers are valid")]
    Search(SearchArgs),
    #[command(about = "Download the files of the supplied PDB identifiers")]
    Get(GetArgs),
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true)]
    pub ids: Vec<String>,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("format").args(["large", "mmcif", "pdbml"]).multiple(false)))]
pub struct GetArgs {
    /// Keep downloaded files gzip-compressed.
    #[arg(short = 'c', long)]
    pub compressed: bool,

    /// Also download bundles of large structures.
    #[arg(long)]
    pub large: bool,

    /// mmCIF instead of PDB format.
    #[arg(long)]
    pub mmcif: bool,

    /// PDBML (XML) instead of PDB format.
    #[arg(long)]
    pub pdbml: bool,

    /// Also download obsolete entries.
    #[arg(long)]
    pub obsolete: bool,

    #[arg(required = true)]
    pub ids: Vec<String>,
}

impl GetArgs {
    pub fn policy(&self) -> DownloadPolicy {
        let base = if self.mmcif {
            BaseFormat::Mmcif
        } else if self.pdbml {
            BaseFormat::Pdbml
        } else {
            BaseFormat::Pdb
        };
        DownloadPolicy::new(base, self.compressed, self.large, self.obsolete)
    }
}

/// (accepted spelling, canonical form, takes a value)
const FLAGS: &[(&str, &str, bool)] = &[
    ("c", "-c", false),
    ("compressed", "--compressed", false),
    ("large", "--large", false),
    ("mmcif", "--mmcif", false),
    ("pdbml", "--pdbml", false),
    ("obsolete", "--obsolete", false),
    ("json", "--json", false),
    ("v", "-v", false),
    ("verbose", "--verbose", false),
    ("config", "--config", true),
    ("output-dir", "--output-dir", true),
    ("j", "-j", true),
    ("jobs", "--jobs", true),
    ("timeout", "--timeout", true),
    ("version", "--version", false),
];

/// Rewrites `-flag`, `--flag` and `/flag` spellings of known options to the form
/// clap expects, and maps `h`, `?` and `help` in mode position to the help command.
/// Unknown tokens are passed through untouched.
pub fn normalize_args<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out = Vec::new();
    let mut iter = args.into_iter().map(Into::into);
    if let Some(program) = iter.next() {
        out.push(program);
    }

    let mut mode_seen = false;
    let mut expects_value = false;
    for arg in iter {
        if expects_value {
            expects_value = false;
            out.push(arg);
            continue;
        }

        let body = strip_flag_prefix(&arg);
        if !mode_seen {
            if let Some(mode) = body.and_then(mode_name).or_else(|| mode_name(&arg)) {
                mode_seen = true;
                out.push(mode.to_string());
                continue;
            }
        }

        let Some(body) = body else {
            out.push(arg);
            continue;
        };
        let (name, value) = match body.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (body, None),
        };
        match FLAGS.iter().find(|(spelling, _, _)| *spelling == name) {
            Some((_, canonical, takes_value)) => {
                match value {
                    Some(value) => out.push(format!("{canonical}={value}")),
                    None => {
                        expects_value = *takes_value;
                        out.push(canonical.to_string());
                    }
                }
            }
            None => out.push(arg),
        }
    }
    out
}

fn strip_flag_prefix(arg: &str) -> Option<&str> {
    arg.strip_prefix("--")
        .or_else(|| arg.strip_prefix('-'))
        .or_else(|| arg.strip_prefix('/'))
        .filter(|body| !body.is_empty())
}

fn mode_name(token: &str) -> Option<&'static str> {
    match token {
        "help" | "h" | "?" => Some("help"),
        "search" => Some("search"),
        "get" => Some("get"),
        _ => None,
    }
}

pub fn short_usage(name: &str) -> String {
    format!(
        "Usage: {name} help | search <pdb_code>... | get [-c] [-large | -mmcif | -pdbml] [-obsolete] <pdb_code>...\n"
    )
}

pub fn usage(name: &str) -> String {
    let mut text = format!("\n{}", short_usage(name));
    text.push_str(
        "\n Modes:\n\
         \x20   help         Display this help\n\
         \x20   search       Determine whether the supplied PDB codes are valid\n\
         \x20   get          Download the files of the supplied PDB codes\n\
         \n Options of get:\n\
         \x20   -c           Keep files gzip-compressed\n\
         \x20   -large       Also download bundles of large structures\n\
         \x20   -mmcif       Download mmCIF files instead of PDB files\n\
         \x20   -pdbml       Download PDBML (XML) files instead of PDB files\n\
         \x20   -obsolete    Also download obsolete entries\n\
         \n Global options:\n\
         \x20   -json              Print results as JSON\n\
         \x20   -verbose           Debug logging (RUST_LOG takes precedence)\n\
         \x20   -config <path>     Config file (default ./kira-pdb.json)\n\
         \x20   -output-dir <dir>  Directory files are written to\n\
         \x20   -jobs <n>          Parallel transfers\n\
         \x20   -timeout <secs>    Per-transfer timeout\n\
         \n Flags may be written as -flag, --flag or /flag.\n",
    );
    text
}
