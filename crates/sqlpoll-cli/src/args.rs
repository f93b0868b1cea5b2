use std::time::Duration;

use sqlpoll_core::lifecycle::{DEFAULT_MAX_RESULTS, ManagerConfig};
use sqlpoll_core::models::{
    CoreError, CoreErrorKind, QueryContext, QueryExecutionId, QueryRequest, ResultConfiguration,
};
use sqlpoll_core::service::PaginationConfig;

pub const ENDPOINT_ENV: &str = "SQLPOLL_ENDPOINT";

pub const USAGE: &str = "usage: sqlpoll [--endpoint URL] [--interval SECS] [--quiet-query] [--config FILE] <command>

commands:
  run <query> [--database NAME] [--catalog NAME] [--output-location URI]
              [--workgroup NAME] [--token TOKEN] [--wait] [--max-attempts N] [--timeout SECS]
  status <id>
  reason <id>
  poll <id> [--max-attempts N] [--timeout SECS]
  results <id> [--next-token TOKEN] [--max-results N]
  pages <id> [--max-items N] [--page-size N] [--starting-token TOKEN]
  location <id>
  stop <id>";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CliArgs {
    pub endpoint: Option<String>,
    pub interval: Option<Duration>,
    pub quiet_query: bool,
    pub config_path: Option<String>,
    pub command: Command,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Run {
        request: QueryRequest,
        wait: Option<WaitOptions>,
    },
    Status(QueryExecutionId),
    Reason(QueryExecutionId),
    Poll {
        execution_id: QueryExecutionId,
        wait: WaitOptions,
    },
    Results {
        execution_id: QueryExecutionId,
        next_token: Option<String>,
        max_results: u32,
    },
    Pages {
        execution_id: QueryExecutionId,
        pagination: PaginationConfig,
    },
    Location(QueryExecutionId),
    Stop(QueryExecutionId),
    Help,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WaitOptions {
    pub max_attempts: Option<u32>,
    pub timeout: Option<Duration>,
}

impl CliArgs {
    /// Applies `--interval`/`--quiet-query` on top of a loaded or default config.
    pub fn manager_config(&self, base: ManagerConfig) -> ManagerConfig {
        let mut config = base;
        if let Some(interval) = self.interval {
            config = config.sleep_time(interval);
        }
        if self.quiet_query {
            config = config.log_query(false);
        }
        config
    }
}

pub fn parse_args<I>(args: I) -> Result<CliArgs, CoreError>
where
    I: IntoIterator<Item = String>,
{
    let mut endpoint = None;
    let mut interval = None;
    let mut quiet_query = false;
    let mut config_path = None;
    let mut flags = CommandFlags::default();
    let mut positionals = Vec::new();

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => flags.help = true,
            "--endpoint" => endpoint = Some(value(&mut args, &arg)?),
            "--interval" => {
                interval = Some(Duration::from_secs(number(&value(&mut args, &arg)?, &arg)?));
            }
            "--quiet-query" => quiet_query = true,
            "--config" => config_path = Some(value(&mut args, &arg)?),
            "--database" => flags.database = Some(value(&mut args, &arg)?),
            "--catalog" => flags.catalog = Some(value(&mut args, &arg)?),
            "--output-location" => flags.output_location = Some(value(&mut args, &arg)?),
            "--workgroup" => flags.workgroup = Some(value(&mut args, &arg)?),
            "--token" => flags.token = Some(value(&mut args, &arg)?),
            "--wait" => flags.wait = true,
            "--max-attempts" => {
                flags.max_attempts = Some(number(&value(&mut args, &arg)?, &arg)?);
            }
            "--timeout" => {
                flags.timeout = Some(Duration::from_secs(number(&value(&mut args, &arg)?, &arg)?));
            }
            "--next-token" => flags.next_token = Some(value(&mut args, &arg)?),
            "--max-results" => flags.max_results = Some(number(&value(&mut args, &arg)?, &arg)?),
            "--max-items" => flags.max_items = Some(number(&value(&mut args, &arg)?, &arg)?),
            "--page-size" => flags.page_size = Some(number(&value(&mut args, &arg)?, &arg)?),
            "--starting-token" => flags.starting_token = Some(value(&mut args, &arg)?),
            other if other.starts_with("--") => {
                return Err(usage_error(format!("unknown option '{other}'")));
            }
            _ => positionals.push(arg),
        }
    }

    let command = if flags.help {
        Command::Help
    } else {
        build_command(positionals, flags)?
    };

    Ok(CliArgs {
        endpoint,
        interval,
        quiet_query,
        config_path,
        command,
    })
}

#[derive(Default)]
struct CommandFlags {
    help: bool,
    database: Option<String>,
    catalog: Option<String>,
    output_location: Option<String>,
    workgroup: Option<String>,
    token: Option<String>,
    wait: bool,
    max_attempts: Option<u32>,
    timeout: Option<Duration>,
    next_token: Option<String>,
    max_results: Option<u32>,
    max_items: Option<usize>,
    page_size: Option<u32>,
    starting_token: Option<String>,
}

fn build_command(positionals: Vec<String>, flags: CommandFlags) -> Result<Command, CoreError> {
    let mut positionals = positionals.into_iter();
    let Some(name) = positionals.next() else {
        return Ok(Command::Help);
    };
    let operand = positionals.next();
    if let Some(extra) = positionals.next() {
        return Err(usage_error(format!("unexpected argument '{extra}'")));
    }

    let execution_id = |operand: Option<String>| {
        operand
            .map(QueryExecutionId::new)
            .ok_or_else(|| usage_error(format!("'{name}' requires a query execution id")))
    };
    let wait = WaitOptions {
        max_attempts: flags.max_attempts,
        timeout: flags.timeout,
    };

    let command = match name.as_str() {
        "run" => {
            let query =
                operand.ok_or_else(|| usage_error("'run' requires the query text".to_string()))?;
            let mut context = QueryContext::new();
            if let Some(database) = flags.database {
                context = context.with("Database", database);
            }
            if let Some(catalog) = flags.catalog {
                context = context.with("Catalog", catalog);
            }
            let mut result_configuration = ResultConfiguration::new();
            if let Some(location) = flags.output_location {
                result_configuration = result_configuration.with_output_location(location);
            }

            let mut request = QueryRequest::new(query)
                .context(context)
                .result_configuration(result_configuration);
            if let Some(workgroup) = flags.workgroup {
                request = request.workgroup(workgroup);
            }
            if let Some(token) = flags.token {
                request = request.client_request_token(token);
            }

            Command::Run {
                request,
                wait: flags.wait.then_some(wait),
            }
        }
        "status" => Command::Status(execution_id(operand)?),
        "reason" => Command::Reason(execution_id(operand)?),
        "poll" => Command::Poll {
            execution_id: execution_id(operand)?,
            wait,
        },
        "results" => Command::Results {
            execution_id: execution_id(operand)?,
            next_token: flags.next_token,
            max_results: flags.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
        },
        "pages" => {
            let mut pagination = PaginationConfig::new();
            pagination.max_items = flags.max_items;
            pagination.page_size = flags.page_size;
            pagination.starting_token = flags.starting_token;
            Command::Pages {
                execution_id: execution_id(operand)?,
                pagination,
            }
        }
        "location" => Command::Location(execution_id(operand)?),
        "stop" => Command::Stop(execution_id(operand)?),
        other => return Err(usage_error(format!("unknown command '{other}'"))),
    };

    Ok(command)
}

fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, CoreError> {
    args.next()
        .ok_or_else(|| usage_error(format!("'{flag}' requires a value")))
}

fn number<T: std::str::FromStr>(raw: &str, flag: &str) -> Result<T, CoreError> {
    raw.parse()
        .map_err(|_| usage_error(format!("'{flag}' expects a non-negative integer, got '{raw}'")))
}

fn usage_error(message: String) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidArgument, message)
}
