//! REPL control commands, the lines starting with a dot.

use std::fmt;

use chumsky::prelude::*;
use thiserror::Error;

/// Module or function reference, by index or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Index(usize),
    Name(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Target::Index(i) => write!(f, "{}", i),
            Target::Name(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Quit,
    Help,
    DumpModule(Option<Target>),
    DumpFunction {
        function: Option<Target>,
        module: Option<Target>,
    },
    DumpInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("not a command (commands start with '.')")]
    NotACommand,
    #[error("invalid command: {0}")]
    Invalid(String),
}

impl ReplCommand {
    pub const HELP: &'static str = "\
.q, .quit                                  quit
.h, .help                                  show all accepted commands
.dm, .dump_module [#|name]                 print contents of last compiled module (or module by index or by name)
.df, .dump_function [#|name] [#|module]    print contents of last compiled function (or function by index/name from specified module)
.di, .dump_info                            print info about interpreter attributes on this machine
";

    /// The line of [`ReplCommand::HELP`] describing this command.
    pub fn help_line(&self) -> &'static str {
        let prefix = match self {
            ReplCommand::Quit => ".q,",
            ReplCommand::Help => ".h,",
            ReplCommand::DumpModule(_) => ".dm,",
            ReplCommand::DumpFunction { .. } => ".df,",
            ReplCommand::DumpInfo => ".di,",
        };
        Self::HELP
            .lines()
            .find(|line| line.starts_with(prefix))
            .unwrap_or_default()
    }
}

impl fmt::Display for ReplCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReplCommand::Quit => write!(f, ".quit"),
            ReplCommand::Help => write!(f, ".help"),
            ReplCommand::DumpModule(None) => write!(f, ".dump_module"),
            ReplCommand::DumpModule(Some(m)) => write!(f, ".dump_module {}", m),
            ReplCommand::DumpFunction { function, module } => {
                write!(f, ".dump_function")?;
                if let Some(function) = function {
                    write!(f, " {}", function)?;
                }
                if let Some(module) = module {
                    write!(f, " {}", module)?;
                }
                Ok(())
            }
            ReplCommand::DumpInfo => write!(f, ".dump_info"),
        }
    }
}

fn name(
    long: &'static str,
    short: &'static str,
) -> impl Parser<char, (), Error = Simple<char>> + Clone {
    text::keyword(long).or(text::keyword(short))
}

fn target() -> impl Parser<char, Target, Error = Simple<char>> + Clone {
    text::int(10)
        .try_map(|digits: String, span| {
            digits
                .parse()
                .map(Target::Index)
                .map_err(|e| Simple::custom(span, format!("{}", e)))
        })
        .or(filter(|c: &char| !c.is_whitespace())
            .repeated()
            .at_least(1)
            .collect::<String>()
            .map(Target::Name))
}

fn parser() -> impl Parser<char, ReplCommand, Error = Simple<char>> {
    let space = filter(|c: &char| c.is_whitespace()).repeated().at_least(1).ignored();
    let arg = space.ignore_then(target());

    let command = choice((
        name("quit", "q").to(ReplCommand::Quit),
        name("help", "h").to(ReplCommand::Help),
        name("dump_module", "dm")
            .ignore_then(arg.clone().or_not())
            .map(ReplCommand::DumpModule),
        name("dump_function", "df")
            .ignore_then(arg.clone().or_not())
            .then(arg.or_not())
            .map(|(function, module)| ReplCommand::DumpFunction { function, module }),
        name("dump_info", "di").to(ReplCommand::DumpInfo),
    ));

    just('.')
        .ignore_then(command)
        .then_ignore(filter(|c: &char| c.is_whitespace()).repeated())
        .then_ignore(end())
}

/// Parse one REPL input line (leading whitespace allowed).
pub fn parse(line: &str) -> Result<ReplCommand, CommandError> {
    let line = line.trim_start();
    if !line.starts_with('.') {
        return Err(CommandError::NotACommand);
    }

    parser().parse(line).map_err(|errors| {
        CommandError::Invalid(
            errors
                .into_iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_long_names() {
        assert_eq!(parse(".q"), Ok(ReplCommand::Quit));
        assert_eq!(parse(".quit"), Ok(ReplCommand::Quit));
        assert_eq!(parse("  .h  "), Ok(ReplCommand::Help));
        assert_eq!(parse(".help"), Ok(ReplCommand::Help));
        assert_eq!(parse(".di"), Ok(ReplCommand::DumpInfo));
        assert_eq!(parse(".dump_info"), Ok(ReplCommand::DumpInfo));
    }

    #[test]
    fn dump_module_targets() {
        assert_eq!(parse(".dm"), Ok(ReplCommand::DumpModule(None)));
        assert_eq!(
            parse(".dm 2"),
            Ok(ReplCommand::DumpModule(Some(Target::Index(2))))
        );
        assert_eq!(
            parse(".dump_module std"),
            Ok(ReplCommand::DumpModule(Some(Target::Name("std".into()))))
        );
    }

    #[test]
    fn dump_function_targets() {
        assert_eq!(
            parse(".df"),
            Ok(ReplCommand::DumpFunction {
                function: None,
                module: None
            })
        );
        assert_eq!(
            parse(".df add builtin"),
            Ok(ReplCommand::DumpFunction {
                function: Some(Target::Name("add".into())),
                module: Some(Target::Name("builtin".into())),
            })
        );
        assert_eq!(
            parse(".dump_function 3 0"),
            Ok(ReplCommand::DumpFunction {
                function: Some(Target::Index(3)),
                module: Some(Target::Index(0)),
            })
        );
    }

    #[test]
    fn rejects_unknown_and_extra() {
        assert_eq!(parse("1 + 2"), Err(CommandError::NotACommand));
        assert!(matches!(parse(".dump"), Err(CommandError::Invalid(_))));
        assert!(matches!(parse(".quitx"), Err(CommandError::Invalid(_))));
        assert!(matches!(parse(".q now"), Err(CommandError::Invalid(_))));
        assert!(matches!(parse(".df a b c"), Err(CommandError::Invalid(_))));
    }

    #[test]
    fn display_round_trip() {
        let cmd = ReplCommand::DumpFunction {
            function: Some(Target::Name("main".into())),
            module: Some(Target::Index(1)),
        };
        assert_eq!(cmd.to_string(), ".dump_function main 1");
        assert_eq!(parse(&cmd.to_string()), Ok(cmd));
    }

    #[test]
    fn help_lines() {
        assert!(ReplCommand::Quit.help_line().starts_with(".q, .quit"));
        assert!(ReplCommand::DumpModule(None)
            .help_line()
            .contains("[#|name]"));
        assert_eq!(ReplCommand::HELP.lines().count(), 5);
    }
}
