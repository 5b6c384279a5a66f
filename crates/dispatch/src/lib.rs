//! Command dispatch core: the command bus, the plugin registry, the panel
//! state store and the single-consumer dispatcher that ties them together.

pub mod bus;
pub mod dispatcher;
pub mod panels;
pub mod plugins;
pub mod registry;

pub use bus::{CommandBus, CommandReceiver, Envelope, PendingReply, ShutdownSignal};
pub use dispatcher::{DispatchReport, Dispatcher, DispatcherState};
pub use panels::PanelStore;
pub use registry::{plugin_fn, Plugin, PluginContext, PluginRegistry, PluginRegistryBuilder};
