//! Logging Module
//!
//! Structured logging built on `tracing`. The CLI installs a compact
//! subscriber; `RUST_LOG` overrides the configured level when set.

use std::time::Instant;

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include timestamps
    pub timestamps: bool,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            timestamps: true,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose config for debugging a training run
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ..Self::default()
        }
    }

    /// Warnings and errors only
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Warn,
            timestamps: false,
            ..Self::default()
        }
    }

    /// Plain output for log files and CI
    pub fn production() -> Self {
        Self {
            ansi_colors: false,
            ..Self::default()
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a level name, falling back to `Info`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Initialize the global subscriber with the given configuration
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact();

    let result = if config.timestamps {
        tracing::subscriber::set_global_default(builder.finish())
    } else {
        tracing::subscriber::set_global_default(builder.without_time().finish())
    };

    result.map_err(|e| format!("Failed to initialize logging: {}", e))
}

/// Per-epoch training progress logger
pub struct TrainingLogger {
    epoch: usize,
    max_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(max_epochs: usize) -> Self {
        Self {
            epoch: 0,
            max_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch (0-indexed)
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();
        tracing::debug!("Epoch {}/{} started", epoch + 1, self.max_epochs);
    }

    /// Log end of an epoch with its Keras-style summary line
    pub fn end_epoch(&self, train_loss: f64, train_acc: f64, val_loss: f64, val_acc: f64, lr: f64) {
        tracing::info!(
            "Epoch {}/{} ({:.2}s) | loss: {:.4} | acc: {:.2}% | val_loss: {:.4} | val_acc: {:.2}% | lr: {:.2e}",
            self.epoch + 1,
            self.max_epochs,
            self.epoch_start.elapsed().as_secs_f64(),
            train_loss,
            train_acc * 100.0,
            val_loss,
            val_acc * 100.0,
            lr
        );
    }

    pub fn log_new_best(&self, val_loss: f64) {
        tracing::debug!("New best val_loss: {:.4}", val_loss);
    }

    pub fn log_lr_reduced(&self, old_lr: f64, new_lr: f64) {
        tracing::info!("Reducing learning rate: {:.2e} -> {:.2e}", old_lr, new_lr);
    }

    pub fn log_early_stop(&self, patience: usize, best_epoch: usize) {
        tracing::warn!(
            "Early stopping after {} epochs without improvement, restoring weights from epoch {}",
            patience,
            best_epoch + 1
        );
    }

    pub fn log_complete(&self, epochs_run: usize, best_val_loss: f64) {
        tracing::info!(
            "Training complete: {} epochs in {:.1}s | best val_loss: {:.4}",
            epochs_run,
            self.training_start.elapsed().as_secs_f64(),
            best_val_loss
        );
    }
}
