use std::process::ExitCode;

use clap::Parser;
use syscfg::cleanup::{INTERRUPTED_EXIT_CODE, Interrupt, Teardown};
use syscfg::cli::{Cli, Command};
use syscfg::commands::{self, Shared};
use syscfg::error::TaskError;
use syscfg::logging::{self, ConsoleOptions, Logger};

fn main() -> ExitCode {
    let args = Cli::parse();
    if matches!(args.command, Command::Version) {
        return match commands::version::run(&mut std::io::stdout().lock()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(_) => ExitCode::FAILURE,
        };
    }

    let options = ConsoleOptions {
        verbose: args.global.verbose,
        quiet: args.global.quiet,
        color: logging::color_enabled(args.global.no_color),
        json: args.global.json,
    };
    let log_path = logging::init_subscriber(options, args.command.log_name());
    let shared = Shared {
        log: std::sync::Arc::new(Logger::new(log_path)),
        teardown: Teardown::new(),
        interrupt: Interrupt::new(),
    };
    install_signal_handler(&shared);

    let global = &args.global;
    let result = match &args.command {
        Command::Deploy(opts) => commands::deploy::run(global, opts, &shared),
        Command::Diff(opts) => commands::diff::run(global, opts, &shared),
        Command::Verify => commands::verify::run_static(global, &shared),
        Command::VerifyRuntime => commands::verify::run_runtime(global, &shared),
        Command::Lint => commands::lint::run(global, &shared),
        Command::Uninstall => commands::uninstall::run(global, &shared),
        Command::Version => Ok(()),
    };
    shared.teardown.run();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let interrupted = shared.interrupt.is_set()
                || matches!(e.downcast_ref::<TaskError>(), Some(TaskError::Interrupted));
            if interrupted {
                shared.log.error("interrupted");
                exit_code(INTERRUPTED_EXIT_CODE)
            } else {
                shared.log.error(&format!("{e:#}"));
                ExitCode::FAILURE
            }
        }
    }
}

/// First signal: stop after the current step. Second signal: tear down
/// and exit immediately.
fn install_signal_handler(shared: &Shared) {
    let teardown = shared.teardown.clone();
    let interrupt = shared.interrupt.clone();
    let installed = ctrlc::set_handler(move || {
        if interrupt.signal() == 1 {
            tracing::warn!("interrupted; stopping after the current step (repeat to abort now)");
        } else {
            teardown.run();
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });
    if let Err(e) = installed {
        shared
            .log
            .warn(&format!("cannot install signal handler: {e}"));
    }
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
