use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
mod auth;
use krypton::{CryptoError, FileStorage, Krypton, Storage, default_keyfile_path};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const CHANGE_PASSWORD_WARNING: &str = "Once you change your password, everything encrypted \
with any previous password is IRRECOVERABLE: encryption keys are new every time you set \
a password, even if the password itself is the same. Decrypt ALL files first.";

fn resolve_keyfile(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(p),
        None => default_keyfile_path(),
    }
}

#[derive(Debug, Parser)]
#[command(name = "krypton")]
#[command(
    version,
    about = "Encrypt notes under a password that can change without re-encrypting the data key."
)]
struct Cli {
    /// Path to the key file
    #[arg(long, global = true, value_name = "PATH", env = "KRYPTON_KEYFILE")]
    keyfile: Option<PathBuf>,

    /// Also encrypt the YAML front matter of documents
    #[arg(
        long,
        global = true,
        default_value_t = false,
        env = "KRYPTON_INCLUDE_FRONTMATTER"
    )]
    include_frontmatter: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Chooses a password and creates the encryption keys
    Init,

    /// Encrypts a file in place, or stdin to stdout
    Encrypt { file: Option<PathBuf> },

    /// Decrypts a file in place, or stdin to stdout
    Decrypt { file: Option<PathBuf> },

    /// Replaces the encryption keys with new ones under a new password
    ChangePassword {
        /// Skip the confirmation prompt
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },

    /// Shows information about the key file
    Info,
}

#[derive(Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .try_init();
}

fn transform(
    kr: &Krypton<FileStorage>,
    file: Option<PathBuf>,
    include_frontmatter: bool,
    direction: Direction,
) -> Result<()> {
    if !kr.exists() {
        bail!(
            "no key file at {}; run `krypton init` to choose a password",
            kr.path().display()
        );
    }
    let password = auth::read_password()?;

    let input = match &file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let output = match direction {
        Direction::Encrypt => kr.encrypt(&input, &password, include_frontmatter)?,
        Direction::Decrypt => kr.decrypt(&input, &password, include_frontmatter)?,
    };
    drop(password);

    match file {
        Some(path) => {
            FileStorage
                .save(&path, output.as_bytes())
                .with_context(|| format!("could not write {}", path.display()))?;
            let verb = match direction {
                Direction::Encrypt => "encrypted",
                Direction::Decrypt => "decrypted",
            };
            println!("{verb} {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(output.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn run(args: Cli) -> Result<()> {
    let keyfile = resolve_keyfile(args.keyfile)?;
    let kr = Krypton::new(FileStorage, keyfile);

    match args.command {
        Commands::Init => {
            if kr.exists() {
                bail!(
                    "key file already exists at {}; use `krypton change-password` instead",
                    kr.path().display()
                );
            }
            let password = auth::read_new_password_with_confirmation()?;
            kr.init(&password)?;
            println!("encryption keys created at {}", kr.path().display());
        }
        Commands::Encrypt { file } => {
            transform(&kr, file, args.include_frontmatter, Direction::Encrypt)?;
        }
        Commands::Decrypt { file } => {
            transform(&kr, file, args.include_frontmatter, Direction::Decrypt)?;
        }
        Commands::ChangePassword { yes } => {
            if !kr.exists() {
                bail!("no key file at {}; run `krypton init` first", kr.path().display());
            }
            eprintln!("WARNING: {CHANGE_PASSWORD_WARNING}");
            if !yes && !auth::confirm("Are you sure you want to continue?")? {
                bail!("password not changed (pass --yes to confirm non-interactively)");
            }
            let password = auth::read_new_password_with_confirmation()?;
            kr.change_password(&password)?;
            println!("password changed");
        }
        Commands::Info => {
            let system = kr.load()?;
            println!("key file: {}", kr.path().display());
            match system.decode() {
                Ok(_) => println!("status:   well-formed"),
                Err(e) => println!("status:   malformed ({e})"),
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    let args = Cli::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<CryptoError>() {
                Some(err) if err.is_password_verification() => {
                    eprintln!("error: password is incorrect");
                }
                _ => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
