use clap::Parser;

use crate::cloudwatch::event::MessageFormat;
use crate::container::PullPolicy;

/// Run a command in a Docker image and send its output to AWS CloudWatch Logs.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Image the command runs in.
    #[arg(long)]
    pub docker_image: String,

    /// Command passed verbatim to `bash -c` inside the container.
    #[arg(long, conflicts_with = "args", required_unless_present = "args")]
    pub bash_command: Option<String>,

    /// Command and arguments executed directly, without a shell.
    #[arg(last = true, value_name = "ARGS")]
    pub args: Vec<String>,

    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub aws_access_key_id: String,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub aws_secret_access_key: String,

    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    pub aws_session_token: Option<String>,

    #[arg(long, visible_alias = "awsregion", env = "AWS_REGION")]
    pub aws_region: String,

    /// Log group receiving the output. Created if missing.
    #[arg(long)]
    pub aws_cloudwatch_group: String,

    /// Log stream receiving the output. Created if missing.
    #[arg(long)]
    pub aws_cloudwatch_stream: String,

    /// Override the CloudWatch Logs endpoint (e.g. a local emulator).
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// When to pull the image before running it.
    #[arg(long, value_enum, default_value_t = PullPolicy::Missing)]
    pub pull: PullPolicy,

    /// Maximum number of lines sent in one request.
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u16).range(1..=10000))]
    pub batch_size: u16,

    /// How each line is rendered into a log event message.
    #[arg(long, value_enum, default_value_t = MessageFormat::Plain)]
    pub message_format: MessageFormat,
}
