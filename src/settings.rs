//! Configuration and settings management for the `procpool` demonstration binary.
//!
//! This module handles the configuration hierarchy from multiple sources:
//! 1. Command-line arguments,
//! 2. Environment variables,
//! 3. Configuration files (in order):
//!    - Custom path specified via CLI or `PROCPOOL_CONF`,
//!    - `~/.procpoolrc.toml`, and
//!    - `$XDG_CONFIG_HOME/procpool/rc.toml`.
//!
//! Settings are resolved with CLI arguments taking precedence over environment variables, which
//! take precedence over configuration files.

use anyhow::{Context, Result};
use clap::Parser;
use non_empty_string::NonEmptyString;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::env::{self};
use std::path::PathBuf;

/// Command-line arguments parser.
#[derive(Parser, Default)]
#[command(about, version)]
struct CliArgs {
    /// Path to a configuration file. If relative, this is relative to the current working
    /// directory.
    #[arg(long)]
    conf: Option<PathBuf>,

    /// Number of child processes to run concurrently. Default: 1.
    #[arg(long)]
    count: Option<usize>,

    /// Multiplier used to size the common queue: capacity = count * multiplier. Default: 10.
    #[arg(long)]
    common_queue_multiplier: Option<usize>,

    /// Capacity of each per-channel Writer queue. Default: 2.
    #[arg(long)]
    writer_queue_maxsize: Option<usize>,

    /// The target command that will be executed by every child.
    #[arg(last = true)]
    target: Vec<String>,
}

/// Environment variables configuration container.
#[derive(Default, Debug)]
struct EnvVars {
    /// Path to configuration file (`PROCPOOL_CONF`).
    conf: Option<PathBuf>,
    /// Number of children to run (`PROCPOOL_COUNT`).
    count: Option<usize>,
    /// Common queue multiplier (`PROCPOOL_COMMON_QUEUE_MULTIPLIER`).
    common_queue_multiplier: Option<usize>,
    /// Writer queue capacity (`PROCPOOL_WRITER_QUEUE_MAXSIZE`).
    writer_queue_maxsize: Option<usize>,
    /// Target command to execute (`PROCPOOL_TARGET`).
    target: Option<String>,
}

/// Configuration file structure.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
struct Config {
    /// Number of children to run.
    count: Option<usize>,
    /// Common queue multiplier.
    common_queue_multiplier: Option<usize>,
    /// Writer queue capacity.
    writer_queue_maxsize: Option<usize>,
    /// Target command to execute.
    target: Option<String>,
}

/// Target command specification.
#[derive(Debug)]
pub struct Target {
    /// The executable to run.
    pub executable: NonEmptyString,
    /// Arguments to pass to the executable.
    pub args: Vec<String>,
}

/// Resolved settings after merging all configuration sources.
#[derive(Debug)]
pub struct ResolvedSettings {
    /// Number of child processes to launch.
    pub count: usize,
    /// Common queue capacity multiplier.
    pub common_queue_multiplier: usize,
    /// Writer queue capacity.
    pub writer_queue_maxsize: usize,
    /// Target command specification.
    pub target: Target,
}

/// Gets the resolved settings using command line arguments from the current process.
///
/// This function serves as a convenient wrapper around [`get_settings_with_raw_cli_args`],
/// automatically passing the current process's command line arguments via [`std::env::args`].
///
/// # Errors
///
/// Returns an error if CLI arguments, environment variables, or the configuration file cannot be
/// read or parsed, or if no target command is specified anywhere.
pub fn get_settings() -> Result<ResolvedSettings> {
    get_settings_with_raw_cli_args(std::env::args())
}

/// Resolves settings by processing command line arguments, environment variables, and
/// configuration files.
///
/// # Errors
///
/// This function will return an error if:
/// * Command line arguments cannot be parsed,
/// * Environment variables are invalid or inaccessible,
/// * Configuration files are malformed or cannot be read, or
/// * The target command specification is missing or invalid.
fn get_settings_with_raw_cli_args(
    raw_cli_args: impl IntoIterator<Item = String>,
) -> Result<ResolvedSettings> {
    let cli_args = CliArgs::parse_from(raw_cli_args);
    let env_vars = get_env_vars().context("Error reading environment variables")?;
    let config = get_config(&cli_args, &env_vars).context("Error reading configuration")?;

    Ok(ResolvedSettings {
        count: get_count(&cli_args, &env_vars, &config),
        common_queue_multiplier: get_common_queue_multiplier(&cli_args, &env_vars, &config),
        writer_queue_maxsize: get_writer_queue_maxsize(&cli_args, &env_vars, &config),
        target: get_target(&cli_args, &env_vars, &config).context("Error getting target")?,
    })
}

/// Reads and parses environment variables into a configuration structure.
///
/// # Errors
///
/// This function will return an error if:
/// - `PROCPOOL_CONF` is defined but empty,
/// - `PROCPOOL_COUNT`, `PROCPOOL_COMMON_QUEUE_MULTIPLIER`, or `PROCPOOL_WRITER_QUEUE_MAXSIZE`
///   contain an invalid numeric value, or
/// - Any environment variable exists but cannot be read due to invalid Unicode.
fn get_env_vars() -> Result<EnvVars> {
    Ok(EnvVars {
        conf: {
            match env::var("PROCPOOL_CONF") {
                Ok(env_var) => {
                    if env_var.is_empty() {
                        return Err(anyhow::anyhow!("PROCPOOL_CONF is empty"));
                    }
                    Some(PathBuf::from(env_var))
                }
                Err(std::env::VarError::NotPresent) => None,
                Err(e) => {
                    return Err(anyhow::anyhow!(
                        "Error reading PROCPOOL_CONF environment variable: {}",
                        e
                    ));
                }
            }
        },
        count: parse_usize_env("PROCPOOL_COUNT")?,
        common_queue_multiplier: parse_usize_env("PROCPOOL_COMMON_QUEUE_MULTIPLIER")?,
        writer_queue_maxsize: parse_usize_env("PROCPOOL_WRITER_QUEUE_MAXSIZE")?,
        target: {
            match env::var("PROCPOOL_TARGET") {
                Ok(env_var) => Some(env_var),
                Err(std::env::VarError::NotPresent) => None,
                Err(e) => {
                    return Err(anyhow::anyhow!(
                        "Error reading PROCPOOL_TARGET environment variable: {}",
                        e
                    ));
                }
            }
        },
    })
}

fn parse_usize_env(name: &str) -> Result<Option<usize>> {
    match env::var(name) {
        Ok(env_var) => match env_var.parse() {
            Ok(value) => Ok(Some(value)),
            Err(e) => Err(anyhow::anyhow!(
                "Error parsing {name} environment variable: {e}"
            )),
        },
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(anyhow::anyhow!("Error reading {name} environment variable: {e}")),
    }
}

/// Loads and parses the appropriate configuration file based on a resolution order.
///
/// This function searches for a configuration file in multiple locations, following a specific
/// precedence order:
///
/// 1. Path specified via command-line `--conf` argument.
/// 2. Path specified in the `PROCPOOL_CONF` environment variable.
/// 3. User's home configuration file at `~/.procpoolrc.toml`.
/// 4. XDG configuration directory at `$XDG_CONFIG_HOME/procpool/rc.toml`.
///
/// The first valid configuration file found is parsed and returned. If no configuration file is
/// found or all attempts fail, a default empty configuration is returned.
///
/// # Errors
///
/// This function will return an error if a specified configuration file exists but cannot be
/// read, or if a configuration file contains invalid TOML syntax that cannot be parsed.
fn get_config(cli_args: &CliArgs, env_vars: &EnvVars) -> Result<Config> {
    if let Some(ref path) = cli_args.conf {
        return std::fs::read_to_string(path)
            .context(format!(
                "Error reading configuration file {}",
                path.display()
            ))
            .and_then(|contents| parse_config_contents(&contents));
    }

    if let Some(ref path) = env_vars.conf {
        return std::fs::read_to_string(path)
            .context(format!(
                "Error reading configuration file {}",
                path.display()
            ))
            .and_then(|contents| parse_config_contents(&contents));
    }

    match env::var("HOME") {
        Ok(home) => {
            let home_path = PathBuf::from(home).join(".procpoolrc.toml");
            match std::fs::read_to_string(&home_path) {
                Ok(contents) => {
                    return parse_config_contents(&contents);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
                Err(e) => {
                    return Err(e).context(format!(
                        "Error reading configuration file {}",
                        home_path.display()
                    ));
                }
            }
        }
        Err(std::env::VarError::NotPresent) => (),
        Err(e) => {
            eprintln!("Error reading HOME environment variable: {e}");
        }
    }

    match env::var("XDG_CONFIG_HOME") {
        Ok(xdg_config_home) => {
            let xdg_path = PathBuf::from(xdg_config_home).join("procpool").join("rc.toml");
            match std::fs::read_to_string(&xdg_path) {
                Ok(contents) => {
                    return parse_config_contents(&contents);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
                Err(e) => {
                    return Err(e).context(format!(
                        "Error reading configuration file {}",
                        xdg_path.display()
                    ));
                }
            }
        }
        Err(std::env::VarError::NotPresent) => (),
        Err(e) => {
            eprintln!("Error reading XDG_CONFIG_HOME environment variable: {e}");
        }
    }

    parse_config_contents("")
}

/// Parses a TOML-formatted string into a configuration structure.
///
/// # Errors
///
/// Returns an error if the TOML syntax is invalid or doesn't match [`Config`]'s shape.
fn parse_config_contents(contents: &str) -> Result<Config> {
    toml::from_str(contents).context("Error parsing TOML configuration")
}

/// Determines the child count based on configuration precedence: CLI > env > config > default
/// (1).
fn get_count(cli_args: &CliArgs, env_vars: &EnvVars, config: &Config) -> usize {
    cli_args.count.or(env_vars.count).or(config.count).unwrap_or(1)
}

/// Determines the common queue multiplier based on configuration precedence: CLI > env > config >
/// default (10).
fn get_common_queue_multiplier(cli_args: &CliArgs, env_vars: &EnvVars, config: &Config) -> usize {
    cli_args
        .common_queue_multiplier
        .or(env_vars.common_queue_multiplier)
        .or(config.common_queue_multiplier)
        .unwrap_or(10)
}

/// Determines the writer queue capacity based on configuration precedence: CLI > env > config >
/// default (2).
fn get_writer_queue_maxsize(cli_args: &CliArgs, env_vars: &EnvVars, config: &Config) -> usize {
    cli_args
        .writer_queue_maxsize
        .or(env_vars.writer_queue_maxsize)
        .or(config.writer_queue_maxsize)
        .unwrap_or(2)
}

/// Retrieves the target command to execute based on configuration precedence.
///
/// This function checks multiple configuration sources in the following order:
/// 1. Command-line arguments (after `--`),
/// 2. Environment variables (`PROCPOOL_TARGET`), or
/// 3. Configuration file (`target` field).
///
/// # Errors
///
/// This function will return an error if no target is defined in any configuration source, the
/// target executable name is empty, or the target string cannot be properly tokenized.
fn get_target(cli_args: &CliArgs, env_vars: &EnvVars, config: &Config) -> Result<Target> {
    match get_target_from_cli_arg(&cli_args.target) {
        Ok(target) => return Ok(target),
        Err(CliArgsTargetParseError::NotDefined) => (),
        Err(e) => return Err(e).context("Error getting target from CLI arguments"),
    }

    if let Some(ref target) = env_vars.target {
        match get_target_from_string(target) {
            Ok(target) => return Ok(target),
            Err(e) => {
                return Err(e).context("Error getting target from PROCPOOL_TARGET environment variable");
            }
        }
    }

    if let Some(ref target) = config.target {
        match get_target_from_string(target) {
            Ok(target) => return Ok(target),
            Err(e) => return Err(e).context("Error getting target from configuration file"),
        }
    }

    Err(anyhow::anyhow!(
        "Target not defined in CLI arguments, PROCPOOL_TARGET environment variable, or \
         configuration file"
    ))
}

/// Errors that can occur when parsing target from CLI arguments.
#[derive(Debug)]
enum CliArgsTargetParseError {
    /// No target was provided
    NotDefined,
    /// The executable name was empty
    EmptyExecutable,
}

impl std::fmt::Display for CliArgsTargetParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::NotDefined => write!(f, "Target is not defined"),
            Self::EmptyExecutable => write!(f, "Target executable cannot be empty"),
        }
    }
}

impl std::error::Error for CliArgsTargetParseError {}

/// Parses a target command from CLI arguments.
fn get_target_from_cli_arg(cli_arg: &[String]) -> Result<Target, CliArgsTargetParseError> {
    let target_vec = NonEmpty::from_slice(cli_arg).ok_or(CliArgsTargetParseError::NotDefined)?;
    Ok(Target {
        executable: NonEmptyString::new(target_vec.head)
            .map_err(|_| CliArgsTargetParseError::EmptyExecutable)?,
        args: target_vec.tail,
    })
}

/// Errors that can occur when parsing target from a string.
#[derive(Debug)]
enum StringTargetParseError {
    /// The target string was empty.
    Empty,
    /// Failed to tokenize the target string.
    FailedToTokenize,
    /// The executable name was empty.
    EmptyExecutable,
}

impl std::fmt::Display for StringTargetParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::FailedToTokenize => write!(f, "Failed to tokenize target"),
            Self::Empty => write!(f, "Target cannot be empty"),
            Self::EmptyExecutable => write!(f, "Target executable cannot be empty"),
        }
    }
}

impl std::error::Error for StringTargetParseError {}

/// Parses a target command from a string, using shell-style tokenisation rules.
fn get_target_from_string(target: &str) -> Result<Target, StringTargetParseError> {
    if target.is_empty() {
        return Err(StringTargetParseError::Empty);
    }
    let tokenized_target = shlex::split(target).ok_or(StringTargetParseError::FailedToTokenize)?;
    // unwrap: Safe because we already ensure that target is not empty.
    let target_vec = NonEmpty::from_vec(tokenized_target).unwrap();
    Ok(Target {
        executable: NonEmptyString::new(target_vec.head)
            .map_err(|_| StringTargetParseError::EmptyExecutable)?,
        args: target_vec.tail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    mod get_settings_with_raw_cli_args {
        use super::*;

        #[test]
        fn from_cli_args() {
            let settings = get_settings_with_raw_cli_args(vec![
                "procpool".to_string(),
                "--count".to_string(),
                "3".to_string(),
                "--common-queue-multiplier".to_string(),
                "5".to_string(),
                "--writer-queue-maxsize".to_string(),
                "4".to_string(),
                "--".to_string(),
                "executable".to_string(),
                "arg1".to_string(),
                "arg2".to_string(),
            ])
            .unwrap();

            assert_eq!(settings.count, 3);
            assert_eq!(settings.common_queue_multiplier, 5);
            assert_eq!(settings.writer_queue_maxsize, 4);
            assert_eq!(settings.target.executable.as_str(), "executable");
            assert_eq!(settings.target.args, vec!["arg1", "arg2"]);
        }

        #[test]
        fn from_env_vars() {
            temp_env::with_vars(
                vec![
                    ("PROCPOOL_COUNT", Some("4")),
                    ("PROCPOOL_COMMON_QUEUE_MULTIPLIER", Some("8")),
                    ("PROCPOOL_WRITER_QUEUE_MAXSIZE", Some("3")),
                    ("PROCPOOL_TARGET", Some("executable arg1 arg2")),
                ],
                || {
                    let settings =
                        get_settings_with_raw_cli_args(vec!["procpool".to_string()]).unwrap();

                    assert_eq!(settings.count, 4);
                    assert_eq!(settings.common_queue_multiplier, 8);
                    assert_eq!(settings.writer_queue_maxsize, 3);
                    assert_eq!(settings.target.executable.as_str(), "executable");
                    assert_eq!(settings.target.args, vec!["arg1", "arg2"]);
                },
            );
        }

        #[test]
        fn from_config() {
            let tmp_dir = tempfile::TempDir::new().unwrap();
            let config_path = tmp_dir.path().join("config.toml");
            std::fs::write(
                &config_path,
                r#"
                    count = 2
                    common_queue_multiplier = 6
                    writer_queue_maxsize = 1
                    target = "executable arg1 arg2"
                "#,
            )
            .unwrap();

            let settings = get_settings_with_raw_cli_args(vec![
                "procpool".to_string(),
                "--conf".to_string(),
                config_path.to_str().unwrap().to_string(),
            ])
            .unwrap();

            assert_eq!(settings.count, 2);
            assert_eq!(settings.common_queue_multiplier, 6);
            assert_eq!(settings.writer_queue_maxsize, 1);
            assert_eq!(settings.target.executable.as_str(), "executable");
            assert_eq!(settings.target.args, vec!["arg1", "arg2"]);
        }

        #[test]
        fn with_defaults() {
            let settings = get_settings_with_raw_cli_args(vec![
                "procpool".to_string(),
                "--".to_string(),
                "executable".to_string(),
            ])
            .unwrap();

            assert_eq!(settings.count, 1);
            assert_eq!(settings.common_queue_multiplier, 10);
            assert_eq!(settings.writer_queue_maxsize, 2);
        }

        #[test]
        fn with_invalid_env_var() {
            temp_env::with_vars(vec![("PROCPOOL_COUNT", Some("not_a_number"))], || {
                assert!(
                    get_settings_with_raw_cli_args(vec![
                        "procpool".to_string(),
                        "--".to_string(),
                        "executable".to_string(),
                    ])
                    .unwrap_err()
                    .to_string()
                    .contains("Error reading environment variables")
                );
            });
        }

        #[test]
        fn with_invalid_config() {
            let tmp_dir = tempfile::TempDir::new().unwrap();
            let config_path = tmp_dir.path().join("config.toml");
            std::fs::write(&config_path, "invalid toml").unwrap();

            let args = vec![
                "procpool".to_string(),
                "--conf".to_string(),
                config_path.to_str().unwrap().to_string(),
            ];

            assert!(
                get_settings_with_raw_cli_args(args)
                    .unwrap_err()
                    .to_string()
                    .contains("Error reading configuration")
            );
        }

        #[test]
        fn test_settings_with_missing_target() {
            assert!(
                get_settings_with_raw_cli_args(vec!["procpool".to_string()])
                    .unwrap_err()
                    .to_string()
                    .contains("Error getting target")
            );
        }
    }

    mod get_env_vars {
        use super::*;

        #[test]
        fn empty_environment() {
            temp_env::with_vars(
                vec![
                    ("PROCPOOL_CONF", None::<&str>),
                    ("PROCPOOL_COUNT", None::<&str>),
                    ("PROCPOOL_COMMON_QUEUE_MULTIPLIER", None::<&str>),
                    ("PROCPOOL_WRITER_QUEUE_MAXSIZE", None::<&str>),
                    ("PROCPOOL_TARGET", None::<&str>),
                ],
                || {
                    let env_vars = get_env_vars().unwrap();
                    assert_eq!(env_vars.conf, None);
                    assert_eq!(env_vars.count, None);
                    assert_eq!(env_vars.common_queue_multiplier, None);
                    assert_eq!(env_vars.writer_queue_maxsize, None);
                    assert_eq!(env_vars.target, None);
                },
            );
        }

        #[test]
        fn valid_conf() {
            temp_env::with_vars(vec![("PROCPOOL_CONF", Some("/path/to/config"))], || {
                assert_eq!(
                    get_env_vars().unwrap().conf,
                    Some(PathBuf::from("/path/to/config"))
                );
            });
        }

        #[test]
        fn empty_conf() {
            temp_env::with_vars(vec![("PROCPOOL_CONF", Some(""))], || {
                assert_eq!(get_env_vars().unwrap_err().to_string(), "PROCPOOL_CONF is empty");
            });
        }

        #[test]
        fn valid_count() {
            temp_env::with_vars(vec![("PROCPOOL_COUNT", Some("6"))], || {
                assert_eq!(get_env_vars().unwrap().count, Some(6));
            });
        }

        #[test]
        fn invalid_count() {
            temp_env::with_vars(vec![("PROCPOOL_COUNT", Some("not_a_number"))], || {
                assert!(
                    get_env_vars()
                        .unwrap_err()
                        .to_string()
                        .contains("Error parsing PROCPOOL_COUNT environment variable")
                );
            });
        }

        #[test]
        fn valid_target() {
            temp_env::with_vars(vec![("PROCPOOL_TARGET", Some("echo hello"))], || {
                assert_eq!(get_env_vars().unwrap().target, Some("echo hello".to_string()));
            });
        }
    }

    mod get_config {
        use super::*;
        use std::fs;
        use tempfile::TempDir;

        #[test]
        fn from_cli_args() {
            let tmp_dir = TempDir::new().unwrap();
            let config_path = tmp_dir.path().join("config.toml");
            fs::write(&config_path, "count = 3").unwrap();

            let cli_args = CliArgs {
                conf: Some(config_path),
                ..Default::default()
            };
            let env_vars = EnvVars::default();

            assert_eq!(get_config(&cli_args, &env_vars).unwrap().count, Some(3));
        }

        #[test]
        fn from_cli_args_nonexistent_file() {
            let cli_args = CliArgs {
                conf: Some(PathBuf::from("/nonexistent/config.toml")),
                ..Default::default()
            };
            let env_vars = EnvVars::default();

            assert!(
                get_config(&cli_args, &env_vars)
                    .unwrap_err()
                    .to_string()
                    .contains("Error reading configuration file")
            );
        }

        #[test]
        fn from_cli_args_invalid_toml() {
            let tmp_dir = TempDir::new().unwrap();
            let config_path = tmp_dir.path().join("config.toml");
            fs::write(&config_path, "invalid toml").unwrap();

            let cli_args = CliArgs {
                conf: Some(config_path),
                ..Default::default()
            };
            let env_vars = EnvVars::default();

            assert!(
                get_config(&cli_args, &env_vars)
                    .unwrap_err()
                    .to_string()
                    .contains("Error parsing TOML configuration")
            );
        }

        #[test]
        fn from_env_vars() {
            let tmp_dir = TempDir::new().unwrap();
            let config_path = tmp_dir.path().join("config.toml");
            fs::write(&config_path, "count = 2").unwrap();

            let cli_args = CliArgs::default();
            let env_vars = EnvVars {
                conf: Some(config_path),
                ..Default::default()
            };

            assert_eq!(get_config(&cli_args, &env_vars).unwrap().count, Some(2));
        }

        #[test]
        fn from_home_dir() {
            let tmp_dir = TempDir::new().unwrap();
            let config_path = tmp_dir.path().join(".procpoolrc.toml");
            fs::write(&config_path, "count = 4").unwrap();

            let cli_args = CliArgs::default();
            let env_vars = EnvVars::default();

            temp_env::with_vars(
                vec![("HOME", Some(tmp_dir.path().to_str().unwrap()))],
                || {
                    assert_eq!(get_config(&cli_args, &env_vars).unwrap().count, Some(4));
                },
            );
        }

        #[test]
        fn if_home_dir_not_found_move_on() {
            let tmp_dir = TempDir::new().unwrap();

            let cli_args = CliArgs::default();
            let env_vars = EnvVars::default();

            temp_env::with_vars(
                vec![("HOME", Some(tmp_dir.path().to_str().unwrap()))],
                || {
                    assert_eq!(get_config(&cli_args, &env_vars).unwrap(), Config::default());
                },
            );
        }

        #[test]
        fn from_xdg_config_home() {
            let tmp_dir = TempDir::new().unwrap();
            fs::create_dir_all(tmp_dir.path().join("procpool")).unwrap();
            let config_path = tmp_dir.path().join("procpool/rc.toml");
            fs::write(&config_path, "count = 7").unwrap();

            let cli_args = CliArgs::default();
            let env_vars = EnvVars::default();

            temp_env::with_vars(
                vec![
                    ("HOME", None),
                    ("XDG_CONFIG_HOME", Some(tmp_dir.path().to_str().unwrap())),
                ],
                || {
                    assert_eq!(get_config(&cli_args, &env_vars).unwrap().count, Some(7));
                },
            );
        }

        #[test]
        fn no_config_found() {
            let cli_args = CliArgs::default();
            let env_vars = EnvVars::default();

            temp_env::with_vars(
                vec![("HOME", None::<&str>), ("XDG_CONFIG_HOME", None::<&str>)],
                || {
                    assert_eq!(get_config(&cli_args, &env_vars).unwrap(), Config::default());
                },
            );
        }
    }

    mod get_count {
        use super::*;

        #[test]
        fn precedence_cli_over_env_over_config_over_default() {
            let config = Config {
                count: Some(1),
                ..Default::default()
            };
            let env_vars = EnvVars {
                count: Some(2),
                ..Default::default()
            };
            let cli_args = CliArgs {
                count: Some(3),
                ..Default::default()
            };

            assert_eq!(get_count(&cli_args, &env_vars, &config), 3);
            assert_eq!(get_count(&CliArgs::default(), &env_vars, &config), 2);
            assert_eq!(
                get_count(&CliArgs::default(), &EnvVars::default(), &config),
                1
            );
            assert_eq!(
                get_count(&CliArgs::default(), &EnvVars::default(), &Config::default()),
                1
            );
        }
    }

    mod get_target {
        use super::*;

        #[test]
        fn from_cli_args_success() {
            let cli_args = CliArgs {
                target: vec![
                    "executable".to_string(),
                    "arg1".to_string(),
                    "arg2".to_string(),
                ],
                ..Default::default()
            };
            let env_vars = EnvVars::default();
            let config = Config::default();

            let target = get_target(&cli_args, &env_vars, &config).unwrap();
            assert_eq!(target.executable.as_str(), "executable");
            assert_eq!(target.args, vec!["arg1", "arg2"]);
        }

        #[test]
        fn from_cli_args_invalid() {
            let cli_args = CliArgs {
                target: vec!["".to_string(), "arg1".to_string()],
                ..Default::default()
            };
            let env_vars = EnvVars::default();
            let config = Config::default();

            assert!(
                get_target(&cli_args, &env_vars, &config)
                    .unwrap_err()
                    .to_string()
                    .contains("Error getting target from CLI arguments")
            );
        }

        #[test]
        fn from_env_vars_success() {
            let cli_args = CliArgs::default();
            let env_vars = EnvVars {
                target: Some("executable arg1 arg2".to_string()),
                ..Default::default()
            };
            let config = Config::default();

            let target = get_target(&cli_args, &env_vars, &config).unwrap();
            assert_eq!(target.executable.as_str(), "executable");
            assert_eq!(target.args, vec!["arg1", "arg2"]);
        }

        #[test]
        fn from_config_success() {
            let cli_args = CliArgs::default();
            let env_vars = EnvVars::default();
            let config = Config {
                target: Some("executable arg1 arg2".to_string()),
                ..Default::default()
            };

            let target = get_target(&cli_args, &env_vars, &config).unwrap();
            assert_eq!(target.executable.as_str(), "executable");
            assert_eq!(target.args, vec!["arg1", "arg2"]);
        }

        #[test]
        fn not_defined() {
            let cli_args = CliArgs::default();
            let env_vars = EnvVars::default();
            let config = Config::default();

            assert!(
                get_target(&cli_args, &env_vars, &config)
                    .unwrap_err()
                    .to_string()
                    .contains(
                        "Target not defined in CLI arguments, PROCPOOL_TARGET environment \
                         variable, or configuration file"
                    )
            );
        }
    }

    mod get_target_from_cli_args {
        use super::*;

        #[test]
        fn valid() {
            let args = vec![
                "executable".to_string(),
                "arg1".to_string(),
                "arg2".to_string(),
            ];
            let target = get_target_from_cli_arg(&args).unwrap();
            assert_eq!(target.executable.as_str(), "executable");
            assert_eq!(target.args, vec!["arg1", "arg2"]);
        }

        #[test]
        fn empty() {
            let args = vec![];
            assert!(matches!(
                get_target_from_cli_arg(&args),
                Err(CliArgsTargetParseError::NotDefined)
            ));
        }

        #[test]
        fn with_empty_executable() {
            let args = vec!["".to_string(), "arg1".to_string(), "arg2".to_string()];
            assert!(matches!(
                get_target_from_cli_arg(&args),
                Err(CliArgsTargetParseError::EmptyExecutable)
            ));
        }
    }

    mod get_target_from_string {
        use super::*;

        #[test]
        fn valid() {
            let target = get_target_from_string("executable arg1 arg2").unwrap();
            assert_eq!(target.executable.as_str(), "executable");
            assert_eq!(target.args, vec!["arg1", "arg2"]);
        }

        #[test]
        fn empty() {
            assert!(matches!(
                get_target_from_string(""),
                Err(StringTargetParseError::Empty)
            ));
        }

        #[test]
        fn with_quoted_args() {
            let target = get_target_from_string("executable \"arg with spaces\" arg2").unwrap();
            assert_eq!(target.executable.as_str(), "executable");
            assert_eq!(target.args, vec!["arg with spaces", "arg2"]);
        }

        #[test]
        fn with_wrongly_quoted_args() {
            assert!(matches!(
                get_target_from_string("executable \"unclosed quote arg1 arg2"),
                Err(StringTargetParseError::FailedToTokenize)
            ));
        }

        #[test]
        fn with_empty_executable() {
            assert!(matches!(
                get_target_from_string("\"\" arg1 arg2"),
                Err(StringTargetParseError::EmptyExecutable)
            ));
        }
    }
}
