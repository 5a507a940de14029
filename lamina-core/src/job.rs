//! Print job driver
//!
//! Ties the per-layer parameter selection, the sequencer and the job state
//! machine together. The print engine calls [`PrintJob::separate_layer`]
//! once per layer with the measured area and gets the separation result
//! back; the job state follows every result.

use crate::exposure::{
    AreaFillParameters, ExposureProfile, ExposureProfileStore, FillClass, SlowLayerPolicy,
};
use crate::motion::LayerTarget;
use crate::safety::RecoveryBudget;
use crate::sequencer::{LayerSeparationResult, Sequencer};
use crate::state::{Event, JobState};
use crate::traits::{AbortSignal, Clock, MotionController, TelemetrySink};

/// Errors of the job driver itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum JobError {
    /// Operation not allowed in the current state
    InvalidState(JobState),
}

/// A running print job
pub struct PrintJob<'c, M, T, C> {
    sequencer: Sequencer<'c, M, T, C>,
    store: ExposureProfileStore,
    policy: SlowLayerPolicy,
    state: JobState,
    /// Index of the next layer to separate
    layer: u32,
    /// Fill class chosen for `layer`, kept for retries
    pending: Option<(u32, FillClass)>,
    /// Stall recovery runs left for `layer`, kept for retries
    budget: RecoveryBudget,
    /// Fill class of the last separated layer
    active: FillClass,
}

impl<'c, M, T, C> PrintJob<'c, M, T, C>
where
    M: MotionController,
    T: TelemetrySink,
    C: Clock,
{
    /// Create a job in the idle state
    pub fn new(sequencer: Sequencer<'c, M, T, C>, profile: ExposureProfile) -> Self {
        let budget = sequencer.recovery_budget();
        Self {
            sequencer,
            store: ExposureProfileStore::new(profile),
            policy: SlowLayerPolicy::new(),
            state: JobState::Idle,
            layer: 0,
            pending: None,
            budget,
            active: FillClass::Below,
        }
    }

    /// Current job state
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Index of the next layer to separate
    pub fn layer(&self) -> u32 {
        self.layer
    }

    /// Layers printed with the above set so far
    pub fn slow_layers_done(&self) -> u32 {
        self.policy.slow_layers_done()
    }

    /// Exposure profile store of this job
    pub fn store(&self) -> &ExposureProfileStore {
        &self.store
    }

    /// Sequencer driving this job
    pub fn sequencer(&self) -> &Sequencer<'c, M, T, C> {
        &self.sequencer
    }

    /// Parameter set of the last separated layer
    ///
    /// The print engine reads its exposure delays from here.
    pub fn active_parameters(&self) -> &AreaFillParameters {
        self.store.parameters(self.active)
    }

    fn apply(&mut self, event: Event) {
        let next = self.state.transition(event);
        if next != self.state {
            debug!("Job state {} -> {}", self.state, next);
        }
        self.state = next;
    }

    /// Start the job
    pub fn start(&mut self) -> Result<(), JobError> {
        if !matches!(
            self.state,
            JobState::Idle | JobState::Finished | JobState::Aborted
        ) {
            return Err(JobError::InvalidState(self.state));
        }
        self.layer = 0;
        self.pending = None;
        self.budget = self.sequencer.recovery_budget();
        self.policy = SlowLayerPolicy::new();
        self.active = FillClass::Below;
        info!("Job started, area fill {}", self.store.area_fill());
        self.apply(Event::JobStarted);
        Ok(())
    }

    /// Separate the current layer
    ///
    /// Selects the parameter set from the measured area (a retried layer
    /// keeps its first selection) and runs the separation. Completed layers
    /// advance the layer index; a retryable failure leaves the job in
    /// [`JobState::LayerFailed`] and a fatal one in [`JobState::Fault`].
    pub fn separate_layer<A: AbortSignal + ?Sized>(
        &mut self,
        area_fill_measured: f32,
        layer_height_nm: u32,
        target: LayerTarget,
        abort: &A,
    ) -> Result<LayerSeparationResult, JobError> {
        if self.state != JobState::Ready {
            return Err(JobError::InvalidState(self.state));
        }

        let class = match self.pending {
            Some((layer, class)) if layer == self.layer => class,
            _ => {
                let class = self.policy.classify(
                    &self.store,
                    self.layer,
                    area_fill_measured,
                    layer_height_nm,
                );
                self.pending = Some((self.layer, class));
                class
            }
        };
        self.active = class;

        self.apply(Event::SeparationStarted);
        let params = self.store.parameters(class);
        let result = self.sequencer.separate_layer_with_budget(
            self.layer,
            params,
            target,
            &mut self.budget,
            abort,
        );

        let event = match &result {
            LayerSeparationResult::Completed(_) if target.last_layer => Event::LastLayerCompleted,
            LayerSeparationResult::Completed(_) => Event::SeparationCompleted,
            LayerSeparationResult::Aborted(_) => Event::AbortRequested,
            LayerSeparationResult::Fault(err) if !err.is_fatal() => Event::LayerFailed,
            LayerSeparationResult::Fault(err) => Event::FaultDetected(err.fault_kind()),
        };
        self.apply(event);

        if result.is_completed() {
            self.layer += 1;
            self.pending = None;
            self.budget = self.sequencer.recovery_budget();
        }
        Ok(result)
    }

    /// Stir the resin with the parameter set of the last layer
    pub fn stir_resin<A: AbortSignal + ?Sized>(
        &mut self,
        abort: &A,
    ) -> Result<LayerSeparationResult, JobError> {
        if self.state != JobState::Ready {
            return Err(JobError::InvalidState(self.state));
        }
        self.apply(Event::StirringStarted);

        let moves = self.sequencer.config().stirring.moves;
        let params = self.store.parameters(self.active);
        let result = self.sequencer.stir_resin(params, moves, abort);

        let event = match &result {
            LayerSeparationResult::Completed(_) => Event::StirringCompleted,
            LayerSeparationResult::Aborted(_) => Event::AbortRequested,
            LayerSeparationResult::Fault(err) if !err.is_fatal() => Event::LayerFailed,
            LayerSeparationResult::Fault(err) => Event::FaultDetected(err.fault_kind()),
        };
        self.apply(event);
        Ok(result)
    }

    /// Retry the layer after a retryable failure
    pub fn retry_layer(&mut self) -> Result<(), JobError> {
        if self.state != JobState::LayerFailed {
            return Err(JobError::InvalidState(self.state));
        }
        self.apply(Event::RetryLayer);
        Ok(())
    }

    /// Abort the job outside of a separation
    pub fn abort(&mut self) {
        warn!("Job aborted at layer {}", self.layer);
        self.apply(Event::AbortRequested);
    }

    /// Acknowledge a fault, returning the job to idle
    pub fn acknowledge_fault(&mut self) -> Result<(), JobError> {
        if !self.state.is_fault() {
            return Err(JobError::InvalidState(self.state));
        }
        self.apply(Event::AcknowledgeFault);
        Ok(())
    }
}
