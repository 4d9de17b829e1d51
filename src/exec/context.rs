//! Shared state of an execution pass.

use crate::func::FuncGuid;
use crate::model::FuncId;
use crate::observe::{Plotter, ProgressEntry, ProgressSink};
use crate::tx::TxData;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Ambient state threaded through every execution pass: the graph freeze
/// flag, optional observation channels, per-driver user data and the queue
/// of heavy units awaiting deployment.
#[derive(Default)]
pub struct ExecutionCtx {
    frozen: bool,
    progress: Option<Arc<dyn ProgressSink>>,
    progress_on: bool,
    plotter: Option<Arc<dyn Plotter>>,
    plotter_on: bool,
    user_data: BTreeMap<FuncGuid, Arc<dyn Any + Send + Sync>>,
    tx_data: Option<TxData>,
    to_deploy: Vec<FuncId>,
}

impl ExecutionCtx {
    /// Whether a pass is currently running. While frozen, structural edits
    /// to the model are forbidden and value writes bypass the journal.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }

    pub(crate) fn unfreeze(&mut self) {
        self.frozen = false;
    }

    pub fn set_progress(&mut self, sink: Arc<dyn ProgressSink>) {
        self.progress = Some(sink);
        self.progress_on = true;
    }

    pub fn progress_on(&mut self) {
        self.progress_on = true;
    }

    pub fn progress_off(&mut self) {
        self.progress_on = false;
    }

    /// The progress channel as seen by drivers: silent unless a sink is
    /// installed and enabled.
    pub fn progress(&self) -> ProgressEntry {
        if self.progress_on {
            ProgressEntry::new(self.progress.clone())
        } else {
            ProgressEntry::new(None)
        }
    }

    pub fn set_plotter(&mut self, plotter: Arc<dyn Plotter>) {
        self.plotter = Some(plotter);
        self.plotter_on = true;
    }

    pub fn plotter_on(&mut self) {
        self.plotter_on = true;
    }

    pub fn plotter_off(&mut self) {
        self.plotter_on = false;
    }

    pub fn plotter(&self) -> Option<&Arc<dyn Plotter>> {
        if self.plotter_on {
            self.plotter.as_ref()
        } else {
            None
        }
    }

    /// Attaches an opaque payload for the driver with the given id. The
    /// payload survives across passes until overwritten.
    pub fn set_user_data(&mut self, guid: FuncGuid, data: Arc<dyn Any + Send + Sync>) {
        self.user_data.insert(guid, data);
    }

    pub fn user_data(&self, guid: &FuncGuid) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.user_data.get(guid)
    }

    pub fn set_tx_data(&mut self, data: Option<TxData>) {
        self.tx_data = data;
    }

    pub fn tx_data(&self) -> Option<&TxData> {
        self.tx_data.as_ref()
    }

    /// Queues a heavy unit for deployment on the next pass.
    pub fn deploy(&mut self, fid: FuncId) {
        if !self.to_deploy.contains(&fid) {
            self.to_deploy.push(fid);
        }
    }

    pub(crate) fn take_deploy_queue(&mut self) -> Vec<FuncId> {
        std::mem::take(&mut self.to_deploy)
    }
}

impl std::fmt::Debug for ExecutionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionCtx")
            .field("frozen", &self.frozen)
            .field("progress_on", &self.progress_on)
            .field("plotter_on", &self.plotter_on)
            .field("user_data", &self.user_data.keys().collect::<Vec<_>>())
            .field("tx_data", &self.tx_data)
            .field("to_deploy", &self.to_deploy)
            .finish()
    }
}
