//! Ordered collection of fixed passes and custom pass sets
//!
//! Passes are visited by [`Domain`]: the fixed pass of a domain first, then
//! every pass set installed at that domain in installation order. This order
//! is the execution order of the frame and the order framebuffers are built
//! in, so an importing pass always comes after the pass it imports from.

use std::collections::{BTreeMap, BTreeSet};

use ash::{vk, Device};
use log::{debug, info};

use crate::config::{PassSetup, RenderConfig};
use crate::error::{EngineError, EngineResult};
use crate::render::commands::DrawCommandBuffer;
use crate::render::domain::Domain;
use crate::render::material::MaterialResolver;
use crate::render::pass_interface::PassInterface;
use crate::render::pass_set::PassSet;
use crate::render::passes::{forward, post_process, transparency, user_interface, BloomPassSet};

/// Owner of every pass of the frame
pub struct PassManager {
    setup: PassSetup,
    fixed_passes: BTreeMap<Domain, PassInterface>,
    pass_sets: BTreeMap<Domain, Vec<Box<dyn PassSet>>>,
    finalized: bool,
    final_pass_name: Option<String>,
}

impl PassManager {
    /// Build the fixed pass chain
    pub fn new(setup: PassSetup) -> EngineResult<Self> {
        let forward = forward::build(&setup, None)?;
        let transparency = transparency::build(&setup, Some(&forward))?;
        let post_process = post_process::build(&setup, Some(&transparency))?;
        let user_interface = user_interface::build(&setup, Some(&post_process))?;

        let fixed_passes = BTreeMap::from([
            (Domain::Forward, forward),
            (Domain::Transparency, transparency),
            (Domain::PostProcess, post_process),
            (Domain::UserInterface, user_interface),
        ]);
        debug!("Fixed passes built: {:?}", fixed_passes.keys().collect::<Vec<_>>());

        Ok(Self {
            setup,
            fixed_passes,
            pass_sets: BTreeMap::new(),
            finalized: false,
            final_pass_name: None,
        })
    }

    /// Build the fixed chain and the pass sets `config` enables
    pub fn from_config(config: &RenderConfig, depth_format: vk::Format, present_format: vk::Format) -> EngineResult<Self> {
        let mut manager = Self::new(PassSetup::new(config, depth_format, present_format))?;
        if config.bloom_enabled {
            manager.install_custom_pass_set(BloomPassSet::new)?;
        }
        Ok(manager)
    }

    /// Inputs the passes were built from
    pub fn setup(&self) -> &PassSetup {
        &self.setup
    }

    /// Build a pass set against the current passes and insert it after its begin domain
    ///
    /// When the set names an export domain, the fixed pass there is extended to
    /// import the set's output. Sets can only be installed before
    /// [`PassManager::finalize`].
    pub fn install_custom_pass_set<T, F>(&mut self, build: F) -> EngineResult<()>
    where
        T: PassSet + 'static,
        F: FnOnce(&PassSetup, &PassManager) -> EngineResult<T>,
    {
        if self.finalized {
            return Err(EngineError::invalid("Pass sets must be installed before the passes are finalized"));
        }
        let set = build(&self.setup, self)?;
        if self.pass_set(set.name()).is_some() {
            return Err(EngineError::invalid(format!("Pass set {} is already installed", set.name())));
        }
        if let Some(domain) = set.export_domain() {
            let export_pass = self
                .fixed_passes
                .get_mut(&domain)
                .ok_or_else(|| EngineError::UnknownPass(domain.name().to_owned()))?;
            set.connect_export_pass(export_pass)?;
        }
        info!(
            "Installed pass set {} after {} with {} passes",
            set.name(),
            set.begin_domain(),
            set.passes().len()
        );
        self.pass_sets.entry(set.begin_domain()).or_default().push(Box::new(set));
        Ok(())
    }

    /// Freeze the subpass graph of every pass
    pub fn finalize(&mut self) {
        self.for_each_pass_mut(PassInterface::finalize);
        self.final_pass_name = self.last_pass_name();
        self.finalized = true;
    }

    /// Whether [`PassManager::finalize`] ran
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Finalize and create the native render pass of every pass
    pub fn create_render_passes(&mut self, device: &Device) -> EngineResult<()> {
        self.finalize();
        self.try_for_each_pass_mut(|pass| pass.build_render_pass(device))?;
        info!("Created {} render passes", self.pass_count());
        Ok(())
    }

    fn domains(&self) -> BTreeSet<Domain> {
        self.fixed_passes.keys().chain(self.pass_sets.keys()).copied().collect()
    }

    /// Visit every pass in execution order
    pub fn for_each_pass(&self, mut visit: impl FnMut(&PassInterface)) {
        for domain in self.domains() {
            if let Some(pass) = self.fixed_passes.get(&domain) {
                visit(pass);
            }
            for set in self.pass_sets.get(&domain).into_iter().flatten() {
                set.passes().iter().for_each(&mut visit);
            }
        }
    }

    /// Visit every pass mutably in execution order
    pub fn for_each_pass_mut(&mut self, mut visit: impl FnMut(&mut PassInterface)) {
        for domain in self.domains() {
            if let Some(pass) = self.fixed_passes.get_mut(&domain) {
                visit(pass);
            }
            for set in self.pass_sets.get_mut(&domain).into_iter().flatten() {
                set.passes_mut().iter_mut().for_each(&mut visit);
            }
        }
    }

    /// Visit every pass mutably in execution order, stopping at the first error
    pub fn try_for_each_pass_mut(
        &mut self,
        mut visit: impl FnMut(&mut PassInterface) -> EngineResult<()>,
    ) -> EngineResult<()> {
        for domain in self.domains() {
            if let Some(pass) = self.fixed_passes.get_mut(&domain) {
                visit(pass)?;
            }
            for set in self.pass_sets.get_mut(&domain).into_iter().flatten() {
                set.passes_mut().iter_mut().try_for_each(&mut visit)?;
            }
        }
        Ok(())
    }

    /// Names of every pass in execution order
    pub fn pass_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.for_each_pass(|pass| names.push(pass.name().to_owned()));
        names
    }

    /// Number of passes including those of pass sets
    pub fn pass_count(&self) -> usize {
        let mut count = 0;
        self.for_each_pass(|_| count += 1);
        count
    }

    /// Fixed pass of `domain`
    pub fn find_pass(&self, domain: Domain) -> Option<&PassInterface> {
        self.fixed_passes.get(&domain)
    }

    /// Mutable fixed pass of `domain`
    pub fn find_pass_mut(&mut self, domain: Domain) -> Option<&mut PassInterface> {
        self.fixed_passes.get_mut(&domain)
    }

    /// Any pass by name
    pub fn find_pass_by_name(&self, name: &str) -> Option<&PassInterface> {
        self.fixed_passes
            .values()
            .find(|pass| pass.name() == name)
            .or_else(|| self.sets().find_map(|set| set.find_pass(name)))
    }

    /// Any pass by name, mutably
    pub fn find_pass_by_name_mut(&mut self, name: &str) -> Option<&mut PassInterface> {
        if let Some(pass) = self.fixed_passes.values_mut().find(|pass| pass.name() == name) {
            return Some(pass);
        }
        self.pass_sets
            .values_mut()
            .flatten()
            .find_map(|set| set.passes_mut().iter_mut().find(|pass| pass.name() == name))
    }

    /// Whether `name` is the last pass of the frame
    ///
    /// The visit order is frozen by [`Self::finalize`], which caches the answer.
    pub fn is_final_pass(&self, name: &str) -> bool {
        if self.finalized {
            return self.final_pass_name.as_deref() == Some(name);
        }
        self.last_pass_name().as_deref() == Some(name)
    }

    fn last_pass_name(&self) -> Option<String> {
        let mut last = None;
        self.for_each_pass(|pass| last = Some(pass.name().to_owned()));
        last
    }

    fn sets(&self) -> impl Iterator<Item = &(dyn PassSet + 'static)> + '_ {
        self.pass_sets.values().flatten().map(Box::as_ref)
    }

    /// Installed pass set by name
    pub fn pass_set(&self, name: &str) -> Option<&dyn PassSet> {
        self.sets().find(|set| set.name() == name)
    }

    /// Installed pass set by name, mutably
    pub fn pass_set_mut(&mut self, name: &str) -> Option<&mut dyn PassSet> {
        for set in self.pass_sets.values_mut().flatten() {
            if set.name() == name {
                let set: &mut dyn PassSet = set.as_mut();
                return Some(set);
            }
        }
        None
    }

    /// Record the pass sets installed after `domain`
    pub fn submit_pass_sets(
        &self,
        domain: Domain,
        cmd: &mut DrawCommandBuffer<'_>,
        resolver: &dyn MaterialResolver,
    ) -> EngineResult<()> {
        for set in self.pass_sets.get(&domain).into_iter().flatten() {
            set.submit_commands(cmd, resolver)?;
        }
        Ok(())
    }
}
