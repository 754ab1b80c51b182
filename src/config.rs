//! Immutable run configuration.
//!
//! Everything the launcher and the shipper need is decided once from the
//! command line and then only borrowed.

use std::fmt;

use crate::cli::Args;
use crate::cloudwatch::event::MessageFormat;
use crate::container::PullPolicy;

const MAX_NAME_LEN: usize = 512;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub container: ContainerSpec,
    pub destination: Destination,
    pub aws: AwsSettings,
    pub shipping: ShippingOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub command: CommandLine,
    pub pull: PullPolicy,
}

/// What the container executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Executed as the container command, no shell involved.
    Argv(Vec<String>),
    /// Handed to `bash -c` with the image entrypoint replaced by `bash`.
    Shell(String),
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandLine::Argv(argv) => f.write_str(&shell_words::join(argv)),
            CommandLine::Shell(script) => f.write_str(script),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub group: String,
    pub stream: String,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.stream)
    }
}

#[derive(Debug, Clone)]
pub struct AwsSettings {
    pub credentials: StaticCredentials,
    pub region: String,
    pub endpoint_url: Option<String>,
}

#[derive(Clone)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShippingOptions {
    pub batch_size: usize,
    pub format: MessageFormat,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("A command is required, either --bash-command or arguments after --")]
    MissingCommand,
    #[error("Invalid log group name '{0}': only letters, digits and '_', '-', '/', '.', '#' are allowed (max 512)")]
    InvalidGroup(String),
    #[error("Invalid log stream name '{0}': ':' and '*' are not allowed (max 512)")]
    InvalidStream(String),
}

impl TryFrom<Args> for RunConfig {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let command = match (args.bash_command, args.args) {
            (Some(script), _) if script.trim().is_empty() => {
                return Err(ConfigError::Empty("--bash-command"));
            }
            (Some(script), _) => CommandLine::Shell(script),
            (None, argv) if argv.is_empty() => return Err(ConfigError::MissingCommand),
            (None, argv) => CommandLine::Argv(argv),
        };

        let image = non_empty("--docker-image", args.docker_image)?;
        let region = non_empty("--aws-region", args.aws_region)?;
        let access_key_id = non_empty("--aws-access-key-id", args.aws_access_key_id)?;
        let secret_access_key = non_empty("--aws-secret-access-key", args.aws_secret_access_key)?;

        let group = args.aws_cloudwatch_group;
        if !is_valid_group_name(&group) {
            return Err(ConfigError::InvalidGroup(group));
        }
        let stream = args.aws_cloudwatch_stream;
        if !is_valid_stream_name(&stream) {
            return Err(ConfigError::InvalidStream(stream));
        }

        Ok(Self {
            container: ContainerSpec {
                image,
                command,
                pull: args.pull,
            },
            destination: Destination { group, stream },
            aws: AwsSettings {
                credentials: StaticCredentials {
                    access_key_id,
                    secret_access_key,
                    session_token: args.aws_session_token.filter(|t| !t.is_empty()),
                },
                region,
                endpoint_url: args.endpoint_url.filter(|u| !u.is_empty()),
            },
            shipping: ShippingOptions {
                batch_size: usize::from(args.batch_size),
                format: args.message_format,
            },
        })
    }
}

fn non_empty(name: &'static str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Empty(name))
    } else {
        Ok(value)
    }
}

fn is_valid_group_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/' | '.' | '#'))
}

fn is_valid_stream_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_NAME_LEN && !name.contains([':', '*'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args {
            docker_image: "python:3.12-slim".to_string(),
            bash_command: None,
            args: vec!["python".to_string(), "-c".to_string(), "print('hi')".to_string()],
            aws_access_key_id: "AKIDEXAMPLE".to_string(),
            aws_secret_access_key: "wJalrXUtnFEMI".to_string(),
            aws_session_token: None,
            aws_region: "eu-central-1".to_string(),
            aws_cloudwatch_group: "/batch/jobs".to_string(),
            aws_cloudwatch_stream: "run-42".to_string(),
            endpoint_url: None,
            pull: PullPolicy::Missing,
            batch_size: 25,
            message_format: MessageFormat::Plain,
        }
    }

    #[test]
    fn test_argv_config() {
        let config = RunConfig::try_from(args()).expect("valid config");
        assert_eq!(
            config.container.command,
            CommandLine::Argv(vec!["python".into(), "-c".into(), "print('hi')".into()])
        );
        assert_eq!(config.destination.to_string(), "/batch/jobs/run-42");
        assert_eq!(config.shipping.batch_size, 25);
        assert_eq!(config.aws.region, "eu-central-1");
    }

    #[test]
    fn test_shell_command_wins_over_empty_argv() {
        let mut input = args();
        input.args.clear();
        input.bash_command = Some("echo $HOME".to_string());
        let config = RunConfig::try_from(input).unwrap();
        assert_eq!(
            config.container.command,
            CommandLine::Shell("echo $HOME".to_string())
        );
    }

    #[test]
    fn test_missing_command() {
        let mut input = args();
        input.args.clear();
        assert_eq!(
            RunConfig::try_from(input).unwrap_err(),
            ConfigError::MissingCommand
        );
    }

    #[test]
    fn test_blank_values_rejected() {
        let mut input = args();
        input.aws_region = "  ".to_string();
        assert_eq!(
            RunConfig::try_from(input).unwrap_err(),
            ConfigError::Empty("--aws-region")
        );

        let mut input = args();
        input.args.clear();
        input.bash_command = Some(String::new());
        assert_eq!(
            RunConfig::try_from(input).unwrap_err(),
            ConfigError::Empty("--bash-command")
        );
    }

    #[test]
    fn test_destination_names() {
        let mut input = args();
        input.aws_cloudwatch_group = "bad group".to_string();
        assert!(matches!(
            RunConfig::try_from(input),
            Err(ConfigError::InvalidGroup(_))
        ));

        let mut input = args();
        input.aws_cloudwatch_stream = "a:b".to_string();
        assert!(matches!(
            RunConfig::try_from(input),
            Err(ConfigError::InvalidStream(_))
        ));

        let mut input = args();
        input.aws_cloudwatch_stream = "s".repeat(513);
        assert!(RunConfig::try_from(input).is_err());

        let mut input = args();
        input.aws_cloudwatch_group = "team.a/#build_1-x".to_string();
        input.aws_cloudwatch_stream = "2024/01/01 [worker]".to_string();
        assert!(RunConfig::try_from(input).is_ok());
    }

    #[test]
    fn test_empty_optional_values_are_dropped() {
        let mut input = args();
        input.aws_session_token = Some(String::new());
        input.endpoint_url = Some(String::new());
        let config = RunConfig::try_from(input).unwrap();
        assert!(config.aws.credentials.session_token.is_none());
        assert!(config.aws.endpoint_url.is_none());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let config = RunConfig::try_from(args()).unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("AKIDEXAMPLE"));
        assert!(!debug.contains("wJalrXUtnFEMI"));
    }

    #[test]
    fn test_command_display() {
        let argv = CommandLine::Argv(vec!["echo".into(), "hello world".into()]);
        assert_eq!(argv.to_string(), "echo 'hello world'");
        let shell = CommandLine::Shell("ls | wc -l".into());
        assert_eq!(shell.to_string(), "ls | wc -l");
    }
}
