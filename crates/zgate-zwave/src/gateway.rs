//! One Z-Wave binding: the mapper plus its background services, wired from
//! a [`GatewayConfig`].

use std::sync::Arc;

use zgate_core::GatewayConfig;
use zgate_devices::VirtualDeviceRegistry;
use zgate_messages::{NotificationCategory, NotificationSeverity, NotificationSink};
use zgate_storage::ObjectStore;

use crate::clock::TimeSync;
use crate::dsk::DskCollection;
use crate::engine::ZWaveEngine;
use crate::error::Result;
use crate::liveness::DeadDetector;
use crate::mapper::{Mapper, MapperOptions};
use crate::postfix::{PostfixFile, PostfixStore};
use crate::reorg::NetworkReorganizer;
use crate::tree::DataTree;

pub struct ZWaveGateway {
    config: GatewayConfig,
    postfix: Arc<PostfixStore>,
    dsk: Arc<DskCollection>,
    mapper: Arc<Mapper>,
    liveness: Arc<DeadDetector>,
    time_sync: Option<Arc<TimeSync>>,
    reorganizer: Arc<NetworkReorganizer>,
}

impl ZWaveGateway {
    /// Build every component. A broken postfix file is reported and
    /// replaced by an empty built-in list.
    pub fn new(
        config: GatewayConfig,
        tree: Arc<DataTree>,
        engine: Arc<dyn ZWaveEngine>,
        registry: Arc<VirtualDeviceRegistry>,
        notifier: Arc<dyn NotificationSink>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self> {
        let postfix = match PostfixStore::open(config.postfix_file.as_deref(), store.clone()) {
            Ok(postfix) => postfix,
            Err(e) => {
                tracing::error!("Cannot load postfix rules: {}", e);
                notifier.notify(
                    NotificationSeverity::Error,
                    &format!("Cannot load postfix rules: {}", e),
                    NotificationCategory::Module,
                );
                PostfixStore::with_builtin(PostfixFile::default(), store.clone())?
            }
        };
        let postfix = Arc::new(postfix);
        let dsk = Arc::new(DskCollection::open(store, Some(tree.clone()))?);

        let mapper = Mapper::new(
            MapperOptions::from_config(&config),
            tree.clone(),
            engine.clone(),
            registry.clone(),
            notifier.clone(),
            postfix.clone(),
            Some(dsk.clone()),
        );
        let liveness = DeadDetector::new(
            config.name.clone(),
            tree.clone(),
            registry,
            notifier,
            config.dead_detection_interval(),
        );
        let time_sync = config
            .time_sync
            .then(|| TimeSync::new(tree.clone(), engine.clone(), config.time_sync_interval()));
        let reorganizer = NetworkReorganizer::new(tree, engine);

        Ok(Self {
            config,
            postfix,
            dsk,
            mapper,
            liveness,
            time_sync,
            reorganizer,
        })
    }

    pub fn start(&self) {
        tracing::info!("Starting Z-Wave binding {}", self.config.name);
        self.mapper.start();
        self.liveness.start();
        if let Some(time_sync) = &self.time_sync {
            time_sync.start();
        }
    }

    /// Stop background tasks and remove every vDev of the binding.
    pub fn stop(&self) {
        if let Some(time_sync) = &self.time_sync {
            time_sync.stop();
        }
        self.liveness.stop();
        self.mapper.stop();
        tracing::info!("Z-Wave binding {} stopped", self.config.name);
    }

    /// Start a network reorganization run.
    pub fn reorganize(&self) -> Result<()> {
        self.reorganizer.start()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn postfix(&self) -> &Arc<PostfixStore> {
        &self.postfix
    }

    pub fn dsk(&self) -> &Arc<DskCollection> {
        &self.dsk
    }

    pub fn mapper(&self) -> &Arc<Mapper> {
        &self.mapper
    }

    pub fn liveness(&self) -> &Arc<DeadDetector> {
        &self.liveness
    }

    pub fn reorganizer(&self) -> &Arc<NetworkReorganizer> {
        &self.reorganizer
    }
}
