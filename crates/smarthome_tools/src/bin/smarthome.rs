#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;

use smarthome_contracts::message::MessageId;
use smarthome_engines::probe::UreqProbe;
use smarthome_os::config::ControlCenterConfig;
use smarthome_os::control_center::ControlCenter;
use smarthome_os::scheduler::SchedulerEvent;
use smarthome_tools::console::{
    execute_console_command, node_action_texts, ConsoleCommand, EventLog, Invocation,
};
use smarthome_tools::messages::clock_label;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let invocation = Invocation::parse(&args)?;

    let control = ControlCenter::from_config(ControlCenterConfig::from_env())
        .map_err(|e| e.to_string())?;

    let command = match invocation {
        Invocation::Console => return run_console(control),
        Invocation::Once(command) => command,
    };
    let mut log = EventLog::default();
    for line in execute_console_command(&control, &mut log, command)? {
        println!("{line}");
    }
    Ok(())
}

fn run_console(control: ControlCenter<UreqProbe>) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start runtime: {e}"))?;
    runtime.block_on(console_loop(Arc::new(control)))
}

async fn console_loop(control: Arc<ControlCenter<UreqProbe>>) -> Result<(), String> {
    let log = Arc::new(Mutex::new(EventLog::default()));
    println!("{}", log.lock().await.push_message(MessageId::Startup));

    let (scheduler, mut events) = control.spawn_scheduler();
    let (line_tx, mut lines) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = stdin.next_line().await {
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SchedulerEvent::ClockTick { at, otp }) => {
                    tracing::debug!(clock = %clock_label(&at, otp.as_str()), "tick");
                }
                Some(SchedulerEvent::OtpRefreshed { code, .. }) => {
                    println!("{}", clock_label(&chrono::Local::now(), code.as_str()));
                }
                None => break,
            },
            line = lines.recv() => {
                let Some(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let command = match ConsoleCommand::parse(&line) {
                    Ok(command) => command,
                    Err(err) => {
                        println!("{err}");
                        continue;
                    }
                };
                if command == ConsoleCommand::Quit {
                    break;
                }
                if command.is_node_action() {
                    // Node actions block on HTTP; keep the clock and OTP running meanwhile.
                    let control = control.clone();
                    let log = log.clone();
                    tokio::spawn(async move {
                        let started_log = log.clone();
                        let result = tokio::task::spawn_blocking(move || {
                            node_action_texts(&control, command, |text| {
                                println!("{}", started_log.blocking_lock().push(text));
                            })
                        })
                        .await;
                        match result {
                            Ok(Ok(texts)) => {
                                let mut log = log.lock().await;
                                for text in texts {
                                    println!("{}", log.push(&text));
                                }
                            }
                            Ok(Err(err)) => println!("{err}"),
                            Err(err) => println!("node action failed: {err}"),
                        }
                    });
                } else {
                    let mut log = log.lock().await;
                    match execute_console_command(&control, &mut log, command) {
                        Ok(out) => out.iter().for_each(|line| println!("{line}")),
                        Err(err) => println!("{err}"),
                    }
                }
            }
        }
    }

    scheduler.shutdown();
    Ok(())
}
