use clap::Parser;
use gdbmux::debugger::config::InterruptStrategy;
use gdbmux::debugger::Config;
use gdbmux::ui::console::AppBuilder;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a configuration file, `~/.config/gdbmux/config.toml` by default
    #[arg(long)]
    config: Option<String>,

    /// gdb binary
    #[arg(long, env = "GDBMUX_GDB")]
    gdb: Option<String>,

    /// How running processes are stopped: `signal` or `mi`
    #[arg(long)]
    interrupt: Option<InterruptStrategy>,

    /// Debug every process in one gdb
    #[arg(long)]
    multi_inferior: bool,

    /// Attach to process
    #[arg(short, long)]
    pid: Vec<u32>,

    /// Program to launch and its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    program: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = Config::from_file(args.config.as_deref()).unwrap_or_default();
    if let Some(gdb) = args.gdb {
        config.gdb_path = gdb;
    }
    if let Some(interrupt) = args.interrupt {
        config.interrupt = interrupt;
    }
    if args.multi_inferior {
        config.multi_inferior = true;
    }

    let app = AppBuilder::new(config).build()?;
    app.run(args.program, args.pid)
}
