// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![deny(clippy::all)]

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::clap::{Arg, ArgMatches, Command};
use ::cotask::{
    runtime::logging, suspend, yield_now, Config, Fail, SharedEventBus, SharedTasks, TriggerId,
};
use ::std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

//======================================================================================================================
// Constants
//======================================================================================================================

const FIXED_UPDATE: &str = "fixed-update";

#[derive(Debug)]
pub struct ProgramArguments {
    frames: u32,
    frame_interval: Duration,
    fixed_interval: Duration,
    config_path: Option<String>,
}

impl ProgramArguments {
    const DEFAULT_FRAMES: u32 = 120;
    const DEFAULT_FRAME_MS: u64 = 16;
    const DEFAULT_FIXED_MS: u64 = 20;

    pub fn new() -> Result<Self> {
        let matches: ArgMatches = Command::new("frame-loop")
            .arg(
                Arg::new("frames")
                    .long("frames")
                    .value_parser(clap::value_parser!(u32))
                    .required(false)
                    .value_name("COUNT")
                    .help("Sets the number of frames to run"),
            )
            .arg(
                Arg::new("frame-ms")
                    .long("frame-ms")
                    .value_parser(clap::value_parser!(u64))
                    .required(false)
                    .value_name("MILLISECONDS")
                    .help("Sets the duration of a frame"),
            )
            .arg(
                Arg::new("fixed-ms")
                    .long("fixed-ms")
                    .value_parser(clap::value_parser!(u64))
                    .required(false)
                    .value_name("MILLISECONDS")
                    .help("Sets the interval of fixed updates"),
            )
            .arg(
                Arg::new("config")
                    .long("config")
                    .value_parser(clap::value_parser!(String))
                    .required(false)
                    .value_name("PATH")
                    .help("Sets the path to the configuration file"),
            )
            .get_matches();

        let mut args: ProgramArguments = ProgramArguments {
            frames: Self::DEFAULT_FRAMES,
            frame_interval: Duration::from_millis(Self::DEFAULT_FRAME_MS),
            fixed_interval: Duration::from_millis(Self::DEFAULT_FIXED_MS),
            config_path: ::std::env::var("CONFIG_PATH").ok(),
        };

        if let Some(frames) = matches.get_one::<u32>("frames") {
            args.frames = *frames;
        }
        if let Some(ms) = matches.get_one::<u64>("frame-ms") {
            args.frame_interval = Duration::from_millis(*ms);
        }
        if let Some(ms) = matches.get_one::<u64>("fixed-ms") {
            if *ms == 0 {
                anyhow::bail!("fixed update interval must be positive");
            }
            args.fixed_interval = Duration::from_millis(*ms);
        }
        if let Some(path) = matches.get_one::<String>("config") {
            args.config_path = Some(path.clone());
        }

        Ok(args)
    }
}

struct Application {
    events: SharedEventBus,
    tasks: SharedTasks<SharedEventBus>,
    args: ProgramArguments,
}

impl Application {
    pub fn new(args: ProgramArguments) -> Result<Self> {
        let events: SharedEventBus = SharedEventBus::new();
        let tasks: SharedTasks<SharedEventBus> = match args.config_path {
            Some(ref path) => SharedTasks::from_config(events.clone(), &Config::new(path)?)?,
            None => SharedTasks::new(events.clone()),
        };
        Ok(Self { events, tasks, args })
    }

    /// Spawns the demo tasks.
    fn spawn(&mut self) -> Result<Arc<AtomicU32>> {
        let steps: Arc<AtomicU32> = Arc::new(AtomicU32::new(0));

        // Reports once per second of wall time, however many frames that takes.
        self.tasks.create_on_update(|| -> Result<(), Fail> {
            let mut seconds: u32 = 0;
            loop {
                suspend(Duration::from_secs(1))?;
                seconds += 1;
                println!("clock: {}s", seconds);
            }
        })?;

        // Counts down over a few frames and finishes.
        self.tasks.create_on_update(|| -> Result<(), Fail> {
            for remaining in (1..=3).rev() {
                println!("countdown: {}", remaining);
                yield_now()?;
            }
            println!("countdown: done");
            Ok(())
        })?;

        let steps_: Arc<AtomicU32> = steps.clone();
        self.tasks.create(TriggerId::from(FIXED_UPDATE), move || -> Result<(), Fail> {
            loop {
                steps_.fetch_add(1, Ordering::Relaxed);
                yield_now()?;
            }
        })?;

        Ok(steps)
    }

    pub fn run(&mut self) -> Result<()> {
        let steps: Arc<AtomicU32> = self.spawn()?;
        let update: TriggerId = TriggerId::UPDATE;
        let fixed_update: TriggerId = TriggerId::from(FIXED_UPDATE);

        let start_time: Instant = Instant::now();
        let mut next_fixed: Duration = self.args.fixed_interval;
        for _ in 0..self.args.frames {
            self.events.fire(&update);
            // Catch up on the fixed steps that fell within this frame.
            while start_time.elapsed() >= next_fixed {
                self.events.fire(&fixed_update);
                next_fixed += self.args.fixed_interval;
            }
            thread::sleep(self.args.frame_interval);
        }

        println!(
            "{} frames, {} fixed steps, {} tasks alive in {:?}",
            self.args.frames,
            steps.load(Ordering::Relaxed),
            self.tasks.get_active_task_count(),
            start_time.elapsed()
        );

        // Give every task a last tick to observe termination.
        self.tasks.terminate_all();
        self.events.fire(&update);
        self.events.fire(&fixed_update);
        Ok(())
    }
}

fn main() -> Result<()> {
    logging::initialize();
    let args: ProgramArguments = ProgramArguments::new()?;
    Application::new(args)?.run()
}
