/*
 * Copyright 2024 Oxide Computer Company
 */

/*
 * An explicit table of commands, built once in main() and handed to the
 * parser.  Each command declares its arguments as data; the parser turns them
 * into getopts options, applies environment fallbacks, and hands the handler
 * an Args with everything resolved.
 */

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, bail, Result};
use futures::future::LocalBoxFuture;
use getopts::Options;

pub type Handler<C> = fn(C, Args) -> LocalBoxFuture<'static, Result<()>>;

/**
 * Wrap an "async fn(C, Args) -> Result<()>" as a Handler.
 */
macro_rules! cmd {
    ($f:ident) => {
        |c, a| futures::FutureExt::boxed_local($f(c, a))
    };
}
pub(crate) use cmd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    Positional {
        name: &'static str,
        help: &'static str,
        required: bool,
    },
    Flag {
        long: &'static str,
        help: &'static str,
    },
    Opt {
        long: &'static str,
        hint: &'static str,
        help: &'static str,
        /**
         * Environment variable consulted when the option is not provided.
         */
        env: Option<&'static str>,
    },
}

pub struct Command<C> {
    pub name: &'static str,
    pub help: &'static str,
    pub args: Vec<Arg>,
    pub handler: Handler<C>,
}

/**
 * Resolved arguments for one invocation of a command.
 */
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Args {
    positionals: BTreeMap<&'static str, String>,
    flags: BTreeSet<&'static str>,
    opts: BTreeMap<&'static str, String>,
}

impl Args {
    pub fn positional(&self, name: &str) -> Option<&str> {
        self.positionals.get(name).map(String::as_str)
    }

    /**
     * A positional argument that the parser has already ensured is present.
     */
    pub fn required(&self, name: &str) -> Result<&str> {
        self.positional(name)
            .ok_or_else(|| anyhow!("missing argument {}", name.to_uppercase()))
    }

    pub fn flag(&self, long: &str) -> bool {
        self.flags.contains(long)
    }

    pub fn opt(&self, long: &str) -> Option<&str> {
        self.opts.get(long).map(String::as_str)
    }
}

pub enum Parsed<'a, C> {
    Help(String),
    Run(&'a Command<C>, Args),
}

pub struct Registry<C> {
    prog: &'static str,
    commands: Vec<Command<C>>,
}

impl<C> Command<C> {
    fn options(&self) -> Options {
        let mut opts = Options::new();
        opts.optflag("h", "help", "print usage information");
        for a in self.args.iter() {
            match a {
                Arg::Positional { .. } => (),
                Arg::Flag { long, help } => {
                    opts.optflag("", long, help);
                }
                Arg::Opt { long, hint, help, env } => {
                    let help = if let Some(env) = env {
                        format!("{help} (default: ${env})")
                    } else {
                        help.to_string()
                    };
                    opts.optopt("", long, &help, hint);
                }
            }
        }
        opts
    }

    fn positionals(
        &self,
    ) -> impl Iterator<Item = (&'static str, &'static str, bool)> + '_ {
        self.args.iter().filter_map(|a| match a {
            Arg::Positional { name, help, required } => {
                Some((*name, *help, *required))
            }
            _ => None,
        })
    }

    fn usage(&self, prog: &str) -> String {
        let mut brief = format!("Usage: {prog} {} [OPTIONS]", self.name);
        for (name, _, required) in self.positionals() {
            if required {
                brief += &format!(" {}", name.to_uppercase());
            } else {
                brief += &format!(" [{}]", name.to_uppercase());
            }
        }
        brief += &format!("\n\n{}", self.help);

        let mut out = self.options().usage(&brief);
        let pos = self.positionals().collect::<Vec<_>>();
        if !pos.is_empty() {
            out += "\nArguments:\n";
            for (name, help, _) in pos {
                out += &format!("    {:<20}{}\n", name.to_uppercase(), help);
            }
        }
        out
    }

    fn parse<F>(
        &self,
        prog: &str,
        argv: &[String],
        env: F,
    ) -> Result<Parsed<'_, C>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let m = match self.options().parse(argv) {
            Ok(m) => m,
            Err(e) => bail!("{e}\n\n{}", self.usage(prog)),
        };

        if m.opt_present("help") {
            return Ok(Parsed::Help(self.usage(prog)));
        }

        let mut args = Args::default();
        let mut free = m.free.iter();
        for a in self.args.iter() {
            match a {
                Arg::Positional { name, required, .. } => {
                    if let Some(v) = free.next() {
                        args.positionals.insert(*name, v.to_string());
                    } else if *required {
                        bail!(
                            "missing argument {}\n\n{}",
                            name.to_uppercase(),
                            self.usage(prog)
                        );
                    }
                }
                Arg::Flag { long, .. } => {
                    if m.opt_present(long) {
                        args.flags.insert(*long);
                    }
                }
                Arg::Opt { long, env: envvar, .. } => {
                    let v = m.opt_str(long).or_else(|| {
                        envvar.and_then(&env).filter(|v| !v.is_empty())
                    });
                    if let Some(v) = v {
                        args.opts.insert(*long, v);
                    }
                }
            }
        }

        if let Some(extra) = free.next() {
            bail!("unexpected argument {extra:?}\n\n{}", self.usage(prog));
        }

        Ok(Parsed::Run(self, args))
    }
}

impl<C> Registry<C> {
    pub fn new(prog: &'static str) -> Registry<C> {
        Registry { prog, commands: Vec::new() }
    }

    pub fn add(
        &mut self,
        name: &'static str,
        help: &'static str,
        args: Vec<Arg>,
        handler: Handler<C>,
    ) -> Result<()> {
        if name == "help" || self.commands.iter().any(|c| c.name == name) {
            bail!("command {name:?} registered twice");
        }
        self.commands.push(Command { name, help, args, handler });
        Ok(())
    }

    /**
     * All commands, in the order in which we present them: sorted by name.
     */
    pub fn commands(&self) -> Vec<&Command<C>> {
        let mut cmds = self.commands.iter().collect::<Vec<_>>();
        cmds.sort_by_key(|c| c.name);
        cmds
    }

    fn find(&self, name: &str) -> Option<&Command<C>> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn usage(&self) -> String {
        let mut out =
            format!("Usage: {} COMMAND [OPTIONS] [ARGS...]\n\n", self.prog);
        out += "Commands:\n";
        for c in self.commands() {
            out += &format!("    {:<12}{}\n", c.name, c.help);
        }
        out += &format!(
            "\nSee '{} help COMMAND' for help with a specific command.\n",
            self.prog
        );
        out
    }

    pub fn parse<F>(&self, argv: &[String], env: F) -> Result<Parsed<'_, C>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some((name, rest)) = argv.split_first() else {
            return Ok(Parsed::Help(self.usage()));
        };

        match name.as_str() {
            "help" | "-h" | "--help" => match rest.first() {
                None => Ok(Parsed::Help(self.usage())),
                Some(sub) => match self.find(sub) {
                    Some(c) => Ok(Parsed::Help(c.usage(self.prog))),
                    None => {
                        bail!("unknown command {sub:?}\n\n{}", self.usage())
                    }
                },
            },
            _ => match self.find(name) {
                Some(c) => c.parse(self.prog, rest, env),
                None => bail!("unknown command {name:?}\n\n{}", self.usage()),
            },
        }
    }

    /**
     * Parse the command line (without the program name) and run the selected
     * command.
     */
    pub async fn run(&self, ctx: C, argv: &[String]) -> Result<()> {
        match self.parse(argv, |n| std::env::var(n).ok())? {
            Parsed::Help(text) => {
                print!("{text}");
                Ok(())
            }
            Parsed::Run(c, args) => (c.handler)(ctx, args).await,
        }
    }
}
