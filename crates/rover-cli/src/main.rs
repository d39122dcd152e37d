//! `rover` – the gateway binary.
//!
//! 1. Loads `~/.rover/config.toml` (defaults when absent).
//! 2. Wires the drive train, camera and gas sensor.  Without a configured
//!    serial port every collaborator is simulated.
//! 3. Runs the capture and sensor loops on their own threads and the cockpit
//!    server on a Tokio runtime.
//! 4. Intercepts **Ctrl-C**: both motors are stopped before anything else,
//!    then every loop is told to wind down.
//!
//! `rover init-config` writes the default configuration file and exits.

mod config;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

use rover_cockpit::{CockpitServer, Gateway};
use rover_hal::sim::{SimCamera, SimMotor, SimPwm, SimSensor};
use rover_hal::{SensorSource, SerialSensor};
use rover_runtime::{ActuatorController, CaptureLoop, DriveTrain, FrameEncoder, SensorLoop};

/// Raw-count increment of the simulated sensor per poll.
const SIM_SENSOR_STEP: i64 = 64;

fn main() -> ExitCode {
    let _telemetry = rover_runtime::init_tracing("rover");

    print_banner();

    if std::env::args().nth(1).as_deref() == Some("init-config") {
        return init_config();
    }

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            println!(
                "  No config at {}; using defaults.",
                config::config_path().display().to_string().dimmed()
            );
            config::defaults()
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::defaults()
        }
    };
    info!(?cfg, "configuration");

    // ── Drive train ───────────────────────────────────────────────────────
    let actuators = Arc::new(ActuatorController::new(DriveTrain {
        left: SimMotor::new("left_motor"),
        right: SimMotor::new("right_motor"),
        left_enable: SimPwm::new("left_enable"),
        right_enable: SimPwm::new("right_enable"),
    }));
    let gateway = Gateway::new(Arc::clone(&actuators));

    // ── Shared shutdown flag + Ctrl-C handler ─────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let actuators = Arc::clone(&actuators);
        let shutdown = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            println!("{}", "⚠  Ctrl-C received – stopping motors …".yellow().bold());
            match actuators.stop() {
                Ok(_) => println!("{}", "  ✓ Motors stopped.".green()),
                Err(e) => error!(error = %e, "failed to stop motors on shutdown"),
            }
            shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!(error = %e, "Failed to install Ctrl-C handler; motors will not be stopped on Ctrl-C");
        }
    }

    // ── Producers ─────────────────────────────────────────────────────────
    let camera = SimCamera::new("front_camera", cfg.camera_width, cfg.camera_height)
        .with_fps(cfg.camera_fps);
    let capture = CaptureLoop::new(
        Box::new(camera),
        FrameEncoder::new(cfg.camera_width, cfg.camera_height, cfg.jpeg_quality),
        gateway.frames.clone(),
        Arc::clone(&shutdown),
    )
    .spawn();

    let sensor = open_sensor(&cfg).map(|source| {
        SensorLoop::new(source, gateway.readings.clone(), Arc::clone(&shutdown))
            .with_interval(Duration::from_millis(cfg.sensor_poll_ms))
            .with_raw_max(cfg.sensor_raw_max)
            .spawn()
    });

    let capture = match capture {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!(error = %e, "could not start capture thread");
            gateway.frames.close();
            None
        }
    };
    let sensor = match sensor {
        Some(Ok(handle)) => Some(handle),
        Some(Err(e)) => {
            error!(error = %e, "could not start sensor thread");
            gateway.readings.close();
            None
        }
        None => {
            gateway.readings.close();
            None
        }
    };

    // ── Cockpit ───────────────────────────────────────────────────────────
    let served = serve(gateway, cfg.http_port, Arc::clone(&shutdown));

    shutdown.store(true, Ordering::SeqCst);
    if let Err(e) = actuators.stop() {
        error!(error = %e, "failed to stop motors on exit");
    }
    join("capture", capture);
    join("sensor", sensor);

    match served {
        Ok(()) => {
            println!("{}", "  ✓ Rover gateway stopped.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {}", "Cockpit error".red(), e);
            ExitCode::FAILURE
        }
    }
}

/// The serial gas sensor when one is configured, otherwise the simulated
/// sweep.  `None` when the serial port cannot be opened.
fn open_sensor(cfg: &config::Config) -> Option<Box<dyn SensorSource>> {
    let Some(path) = cfg.serial_port.as_deref() else {
        println!("  Gas sensor: {}", "simulated".yellow());
        return Some(Box::new(SimSensor::sweep(
            "gas_sensor",
            cfg.sensor_raw_max,
            SIM_SENSOR_STEP,
        )));
    };
    match SerialSensor::open("gas_sensor", path, cfg.serial_baud) {
        Ok(sensor) => {
            println!("  Gas sensor: {} @ {} baud", path.bold(), cfg.serial_baud);
            Some(Box::new(sensor))
        }
        Err(e) => {
            println!("{}: {}", "Gas sensor unavailable".red(), e);
            error!(error = %e, port = path, "serial sensor failed to open; event feed offline");
            None
        }
    }
}

/// Run the cockpit until the shutdown flag is raised.
fn serve(gateway: Gateway, port: u16, shutdown: Arc<AtomicBool>) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("failed to start Tokio runtime: {e}"))?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| format!("bind error on port {port}: {e}"))?;
        println!(
            "  Cockpit listening on {}\n",
            format!("http://localhost:{port}").bold().cyan()
        );

        let stop = async move {
            let mut tick = tokio::time::interval(Duration::from_millis(100));
            while !shutdown.load(Ordering::SeqCst) {
                tick.tick().await;
            }
        };
        CockpitServer::new(gateway)
            .with_port(port)
            .serve_until(listener, stop)
            .await
            .map_err(|e| e.to_string())
    })?;

    // Streaming connections hold their own tasks; don't wait on them.
    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}

fn join(name: &str, handle: Option<JoinHandle<Result<u64, rover_types::RoverError>>>) {
    let Some(handle) = handle else {
        return;
    };
    match handle.join() {
        Ok(Ok(count)) => info!(thread = name, published = count, "producer finished"),
        Ok(Err(e)) => warn!(thread = name, error = %e, "producer ended with error"),
        Err(_) => error!(thread = name, "producer thread panicked"),
    }
}

fn init_config() -> ExitCode {
    let path = config::config_path();
    if path.exists() {
        println!("  Config already exists at {}", path.display().to_string().bold());
        return ExitCode::SUCCESS;
    }
    match config::save(&config::Config::default()) {
        Ok(()) => {
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {}", "Error saving config".red(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___                      "#.bold().cyan());
    println!("{}", r#"  / _ \___ _  _____ ____    "#.bold().cyan());
    println!("{}", r#" / , _/ _ \ |/ / -_) __/    "#.bold().cyan());
    println!("{}", r#"/_/|_|\___/___/\__/_/       "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Rover".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Teleoperated rover gateway");
    println!();
}
