use datatx_channel::ChannelId;

use crate::cmd::IdArgs;
use crate::exit::{CliError, CliResult, SUCCESS};
use crate::output::{print_ids, OutputFormat};

pub fn run(args: IdArgs, format: OutputFormat) -> CliResult<i32> {
    if args.count == 0 {
        return Err(CliError::usage("--count must be at least 1"));
    }

    let ids = (0..args.count)
        .map(|_| generate(args.prefix.as_deref()))
        .collect::<CliResult<Vec<_>>>()?;

    print_ids(&ids, format);
    Ok(SUCCESS)
}

fn generate(prefix: Option<&str>) -> CliResult<String> {
    let id = match prefix {
        Some(prefix) => ChannelId::with_prefix(prefix),
        None => Ok(ChannelId::random()),
    };
    id.map(ChannelId::into_string)
        .map_err(|err| CliError::usage(err.to_string()))
}
