//! Separation service
//!
//! Runs requests on a dedicated worker thread, strictly one at a time. The
//! worker owns the model manager, the separator's FFT scratch and the
//! inference sessions, which are kept while consecutive requests use the
//! same variant.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   Request    ┌──────────────────────┐
//! │   caller    │ ───────────► │  separation worker   │
//! │             │ ◄─────────── │  (named thread)      │
//! └─────────────┘  Response*   └──────────────────────┘
//!                                  │            │
//!                           ┌──────┘            └──────┐
//!                           ▼                          ▼
//!                   ┌──────────────┐          ┌─────────────────┐
//!                   │ ModelManager │          │ InferenceAdapter│
//!                   │ cache / HTTP │          │ (ONNX sessions) │
//!                   └──────────────┘          └─────────────────┘
//! ```
//!
//! Each submitted request gets its own reply channel carrying zero or more
//! [`Response::Progress`] followed by exactly one terminal response.

use std::thread;

use crossbeam::channel::{self, Receiver, Sender};

use super::config::{MaskParams, ModelVariant, SeparationConfig};
use super::error::{Result, SeparationError};
use super::inference::{InferenceAdapter, InferenceLoader, OrtLoader};
use super::model::ModelManager;
use super::pipeline::{
    checkpoints, SeparationProgress, SeparationStage, Separator, StemData, StereoBuffer,
};

// ============================================================================
// Messages
// ============================================================================

/// Work for the separation worker
#[derive(Debug)]
pub enum Request {
    /// Probe whether every stem model of a variant can be sourced
    CheckAvailability { variant: ModelVariant },

    /// Separate a stereo buffer into the variant's stems
    Separate {
        variant: ModelVariant,
        input: StereoBuffer,
    },
}

/// Events on a request's reply channel
#[derive(Debug)]
pub enum Response {
    Progress(SeparationProgress),
    /// Terminal: stems of a `Separate` request
    Result(StemData),
    /// Terminal: the request failed
    Error(SeparationError),
    /// Terminal: answer to `CheckAvailability`
    Availability {
        variant: ModelVariant,
        available: bool,
    },
}

impl Response {
    /// Whether no further responses follow on this channel
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

enum Command {
    Run {
        request: Request,
        reply: Sender<Response>,
    },
    Shutdown,
}

// ============================================================================
// Service
// ============================================================================

/// Handle to the background separation worker
pub struct SeparationService {
    command_tx: Sender<Command>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl SeparationService {
    /// Spawn a worker using the configured disk cache, HTTP and ONNX Runtime
    pub fn spawn(mut config: SeparationConfig) -> Result<Self> {
        config.validate();
        let manager = ModelManager::new(&config)?;
        let loader = OrtLoader::new(config.intra_threads);
        Self::spawn_with(config.mask, manager, Box::new(loader))
    }

    /// Spawn a worker with explicit collaborators
    pub fn spawn_with(
        mask: MaskParams,
        manager: ModelManager,
        loader: Box<dyn InferenceLoader>,
    ) -> Result<Self> {
        let (command_tx, command_rx) = channel::unbounded();

        let thread_handle = thread::Builder::new()
            .name("stem-separation".to_string())
            .spawn(move || {
                let worker = Worker {
                    manager,
                    loader,
                    separator: Separator::new(mask),
                    loaded: None,
                };
                worker.run(command_rx);
            })?;

        Ok(Self {
            command_tx,
            thread_handle: Some(thread_handle),
        })
    }

    /// Queue a request; responses arrive on the returned channel
    pub fn submit(&self, request: Request) -> Receiver<Response> {
        let (reply, responses) = channel::unbounded();
        if let Err(channel::SendError(Command::Run { reply, .. })) =
            self.command_tx.send(Command::Run { request, reply })
        {
            let _ = reply.send(Response::Error(SeparationError::InvalidConfig(
                "separation service is not running".to_string(),
            )));
        }
        responses
    }

    /// Run a separation and wait for it, forwarding progress
    pub fn separate_blocking(
        &self,
        variant: ModelVariant,
        input: StereoBuffer,
        mut progress: impl FnMut(SeparationProgress),
    ) -> Result<StemData> {
        let responses = self.submit(Request::Separate { variant, input });
        for response in responses.iter() {
            match response {
                Response::Progress(p) => progress(p),
                Response::Result(stems) => return Ok(stems),
                Response::Error(e) => return Err(e),
                Response::Availability { .. } => break,
            }
        }
        Err(SeparationError::InvalidConfig(
            "separation worker ended without a result".to_string(),
        ))
    }

    /// Run an availability probe and wait for the answer
    pub fn check_availability_blocking(&self, variant: ModelVariant) -> bool {
        self.submit(Request::CheckAvailability { variant })
            .iter()
            .find_map(|response| match response {
                Response::Availability { available, .. } => Some(available),
                _ => None,
            })
            .unwrap_or(false)
    }

    /// Check if the worker is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop after queued requests and wait for the worker
    pub fn shutdown(&mut self) {
        let _ = self.command_tx.send(Command::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("Separation worker panicked");
            }
        }
    }
}

impl Drop for SeparationService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Worker
// ============================================================================

struct Worker {
    manager: ModelManager,
    loader: Box<dyn InferenceLoader>,
    separator: Separator,
    /// Sessions of the most recently used variant
    loaded: Option<Box<dyn InferenceAdapter>>,
}

impl Worker {
    fn run(mut self, command_rx: Receiver<Command>) {
        log::info!("Separation worker started");

        while let Ok(cmd) = command_rx.recv() {
            match cmd {
                Command::Run { request, reply } => self.handle(request, &reply),
                Command::Shutdown => {
                    log::info!("Separation worker shutting down");
                    break;
                }
            }
        }
    }

    fn handle(&mut self, request: Request, reply: &Sender<Response>) {
        let terminal = match request {
            Request::CheckAvailability { variant } => {
                let available = self.is_loaded(variant) || self.manager.is_available(variant);
                log::info!("Availability of {}: {}", variant, available);
                Response::Availability { variant, available }
            }
            Request::Separate { variant, input } => {
                let mut emit = |p: SeparationProgress| {
                    let _ = reply.send(Response::Progress(p));
                };
                match self.separate(variant, &input, &mut emit) {
                    Ok(stems) => Response::Result(stems),
                    Err(e) => {
                        log::error!("Separation failed: {}", e);
                        Response::Error(e)
                    }
                }
            }
        };
        let _ = reply.send(terminal);
    }

    fn is_loaded(&self, variant: ModelVariant) -> bool {
        self.loaded
            .as_ref()
            .is_some_and(|adapter| adapter.variant() == variant)
    }

    fn separate(
        &mut self,
        variant: ModelVariant,
        input: &StereoBuffer,
        progress: &mut dyn FnMut(SeparationProgress),
    ) -> Result<StemData> {
        input.validate()?;

        if !self.is_loaded(variant) {
            // Free the previous variant's sessions before loading new ones
            self.loaded = None;
            self.manager.check_availability(variant)?;

            progress(SeparationProgress::new(
                SeparationStage::DownloadingModel,
                0.0,
                format!("Fetching {} models", variant.display_name()),
            ));
            let models = self.manager.load_variant(variant, &mut |p| {
                progress(SeparationProgress::new(
                    SeparationStage::DownloadingModel,
                    p * checkpoints::DOWNLOAD_END,
                    format!("Fetching models... {:.0}%", p * 100.0),
                ));
            })?;

            progress(SeparationProgress::new(
                SeparationStage::LoadingModel,
                checkpoints::LOADING,
                "Loading separation models",
            ));
            self.loaded = Some(self.loader.load(variant, models)?);
        } else {
            progress(SeparationProgress::new(
                SeparationStage::LoadingModel,
                checkpoints::LOADING,
                "Reusing loaded models",
            ));
        }

        let adapter = self
            .loaded
            .as_deref_mut()
            .ok_or(SeparationError::ModelUnavailable(variant))?;
        self.separator.separate(input, variant, adapter, progress)
    }
}
