//! Coupled systems of several component instances.
//!
//! A [`SystemDescriptor`] is flattened once into connector slots and an
//! ordered list of connections. Each macro step then:
//!
//! 1. applies external inputs to the system's input connectors
//! 2. steps every component in declaration order, setting its inputs
//!    before the step and reading its outputs after
//! 3. propagates every connection, applying linear transformations
//! 4. records one row with every connector value
//!
//! Components are evaluated in a single pass. Algebraic loops between
//! components are neither detected nor solved.

mod collaborators;
mod descriptor;
mod error;
mod flatten;


pub use collaborators::{
    ArchiveExtractor, CollaboratorError, ComponentLoader, ExtractedArchive, LoadedComponent,
};
pub use descriptor::{
    ComponentElement, Connection, Connector, ConnectorKind, Element, LinearTransformation,
    ParameterBinding, SystemDescriptor,
};
pub use error::{CouplingError, SystemError};

use std::{
    fmt,
    ops::ControlFlow,
    time::{Duration, Instant},
};

use tandem_core::{
    Instance, InstanceOptions, Observer, Row, SimulationResult, Value, ValueKind, ValueRef,
};

use crate::{
    config::SimulationConfig,
    driver::{Driver, driver_for},
    grid::OutputGrid,
    inputs::ExternalInputs,
    run::{self, Action, Completion, Outcome, RunError, RunEvent, SimulationError},
};

use self::flatten::{Binding, FlatSystem, flatten};

/// One instantiated component of a coupled system.
struct Member {
    component: usize,
    instance: Instance,
    driver: Box<dyn Driver>,
    /// Input slots with the variables they feed.
    inputs: Vec<(usize, ValueRef, ValueKind)>,
    /// Output and calculated-parameter slots with the variables they read.
    outputs: Vec<(usize, ValueRef, ValueKind)>,
    timeout: Option<Duration>,
}

/// A running system of coupled instances.
///
/// Owns its instances and the extracted archive. Dropping the system tears
/// it down; call [`CoupledSystem::teardown`] to observe teardown errors.
pub struct CoupledSystem {
    flat: FlatSystem,
    /// Members in instantiation order.
    members: Vec<Member>,
    /// Members in declaration order, as indices into `members`.
    step_order: Vec<usize>,
    values: Vec<Option<Value>>,
    archive: Option<ExtractedArchive>,
    time: f64,
    torn_down: bool,
}

impl CoupledSystem {
    /// Extracts the archive, then instantiates and initializes every
    /// component, most deeply nested first.
    ///
    /// On failure every component created so far is torn down and the
    /// archive is released before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns a [`CouplingError`] for an invalid descriptor or config, a
    /// collaborator failure, or a component that fails to initialize.
    pub fn instantiate(
        descriptor: &SystemDescriptor,
        archive: &str,
        extractor: &mut dyn ArchiveExtractor,
        loader: &mut dyn ComponentLoader,
        config: &SimulationConfig,
    ) -> Result<Self, CouplingError> {
        config.validate()?;
        let flat = flatten(descriptor)?;
        let extracted = extractor
            .extract(archive)
            .map_err(|source| CouplingError::Extract {
                archive: archive.to_owned(),
                source,
            })?;

        let slots = flat.slots.len();
        let mut system = Self {
            flat,
            members: Vec::new(),
            step_order: Vec::new(),
            values: vec![None; slots],
            archive: Some(extracted),
            time: config.start_time,
            torn_down: false,
        };

        match system.build(loader, config) {
            Ok(()) => {
                tracing::info!(
                    system = %system.flat.name,
                    components = system.members.len(),
                    "coupled system initialized"
                );
                Ok(system)
            }
            Err(err) => {
                if let Err(teardown) = system.teardown() {
                    tracing::warn!(system = %system.flat.name, error = %teardown, "teardown after failed instantiation also failed");
                }
                Err(err)
            }
        }
    }

    fn build(&mut self, loader: &mut dyn ComponentLoader, config: &SimulationConfig) -> Result<(), CouplingError> {
        for binding in &self.flat.bindings {
            if let Binding::Slot { slot, value } = binding {
                self.values[*slot] = Some(value.clone());
            }
        }
        self.propagate();

        // Each member's initial outputs reach the inputs of members
        // initialized after it.
        for component in self.flat.instantiation_order() {
            self.add_member(component, loader, config)?;
            self.read_outputs(self.members.len() - 1)?;
            self.propagate();
        }

        let mut order: Vec<usize> = (0..self.members.len()).collect();
        order.sort_by_key(|&i| self.members[i].component);
        self.step_order = order;
        Ok(())
    }

    /// Loads, instantiates, binds, and initializes one component.
    fn add_member(
        &mut self,
        component: usize,
        loader: &mut dyn ComponentLoader,
        config: &SimulationConfig,
    ) -> Result<(), CouplingError> {
        let flat = &self.flat.components[component];
        let path = flat.path.clone();
        let root = self
            .archive
            .as_ref()
            .map(|archive| archive.root().to_path_buf())
            .unwrap_or_default();

        let loaded = loader
            .load(&root, &flat.element)
            .map_err(|source| CouplingError::Load {
                component: path.clone(),
                source,
            })?;

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut bindings = Vec::new();
        for &slot in &flat.slots {
            let connector = &self.flat.slots[slot];
            let variable = loaded.description.variable(&connector.name).ok_or_else(|| {
                SystemError::UnknownVariable {
                    component: path.clone(),
                    name: connector.name.clone(),
                }
            })?;
            if variable.kind != connector.value_kind {
                return Err(SystemError::VariableTypeMismatch {
                    connector: connector.path.clone(),
                    declared: connector.value_kind,
                    actual: variable.kind,
                }
                .into());
            }
            let entry = (slot, variable.value_ref, variable.kind);
            match connector.connector {
                ConnectorKind::Input => inputs.push(entry),
                ConnectorKind::Output | ConnectorKind::CalculatedParameter => outputs.push(entry),
                ConnectorKind::Parameter => {
                    if let Some(value) = &self.values[slot] {
                        bindings.push((connector.name.clone(), value.clone()));
                    }
                }
            }
        }
        bindings.extend(self.flat.bindings.iter().filter_map(|binding| match binding {
            Binding::Variable {
                component: owner,
                name,
                value,
            } if *owner == component => Some((name.clone(), value.clone())),
            _ => None,
        }));

        let initial_inputs: Vec<(ValueRef, Value)> = inputs
            .iter()
            .filter_map(|&(slot, value_ref, _)| {
                self.values[slot].as_ref().map(|value| (value_ref, value.clone()))
            })
            .collect();

        let mut options = InstanceOptions::new(path.clone())
            .resource_location(loaded.resource_location)
            .logging_on(config.logging_on);
        if let Some(kind) = loaded.kind {
            options = options.kind(kind);
        }
        let fail = |source: RunError, last_time| SimulationError {
            instance: path.clone(),
            last_time,
            source,
        };

        let instance = Instance::instantiate(loaded.calls, loaded.description, options)
            .map_err(|err| fail(err.into(), None))?;
        let driver = driver_for(&instance, config).map_err(|err| fail(err.into(), None))?;
        self.members.push(Member {
            component,
            instance,
            driver,
            inputs,
            outputs,
            timeout: None,
        });
        let Some(member) = self.members.last_mut() else {
            return Ok(());
        };

        tracing::debug!(component = %path, "instantiated");
        member
            .initialize(&bindings, &initial_inputs, config)
            .map_err(|err| fail(err, member.instance.last_time()))?;
        Ok(())
    }

    /// Advances the system from its start time to the stop time, one macro
    /// step of `config.step_size` at a time.
    ///
    /// The system is torn down if the run fails; it stays alive otherwise so
    /// that its final values can be inspected.
    ///
    /// # Errors
    ///
    /// Returns an error naming the component that failed, or the system on
    /// timeout. External inputs must name input connectors of the
    /// top-level system.
    pub fn run<O>(
        &mut self,
        config: &SimulationConfig,
        inputs: &ExternalInputs,
        mut observer: O,
    ) -> Result<Outcome, CouplingError>
    where
        O: Observer<RunEvent, Action>,
    {
        if self.torn_down {
            return Err(CouplingError::TornDown);
        }
        config.validate()?;
        for name in inputs.names() {
            if !self.flat.inputs.contains_key(name) {
                return Err(SystemError::UnknownInput { name: name.to_owned() }.into());
            }
        }

        match self.advance(config, inputs, &mut observer) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                if let Err(teardown) = self.teardown() {
                    tracing::warn!(system = %self.flat.name, error = %teardown, "teardown after failed run also failed");
                }
                Err(err)
            }
        }
    }

    fn advance<O>(
        &mut self,
        config: &SimulationConfig,
        inputs: &ExternalInputs,
        observer: &mut O,
    ) -> Result<Outcome, CouplingError>
    where
        O: Observer<RunEvent, Action>,
    {
        let grid = OutputGrid::new(config.start_time, config.stop_time, config.step_size)?;
        let columns = self.flat.slots.iter().map(|slot| slot.path.clone()).collect();
        let mut result = SimulationResult::new(columns);
        let started = Instant::now();
        let timeout = config.timeout();
        for member in &mut self.members {
            member.driver.set_deadline(timeout.map(|limit| started + limit));
            member.timeout = timeout;
        }

        self.time = config.start_time;
        self.apply_inputs(inputs, self.time);
        self.propagate();
        if let ControlFlow::Break(status) = self.record(&mut result, observer)? {
            return Ok(finish(result, status, self.time));
        }

        for t_end in grid.iter().skip(1) {
            self.check_timeout(started, timeout)?;
            self.apply_inputs(inputs, self.time);
            self.propagate();

            let mut terminated = false;
            for index in self.step_order.clone() {
                terminated |= self.step_member(index, t_end)?;
            }
            self.propagate();
            self.time = t_end;

            if let ControlFlow::Break(status) = self.record(&mut result, observer)? {
                return Ok(finish(result, status, self.time));
            }
            if terminated {
                tracing::info!(system = %self.flat.name, time = self.time, "a component ended the run");
                return Ok(finish(result, Completion::Terminated, self.time));
            }
        }

        tracing::info!(system = %self.flat.name, time = self.time, rows = result.len(), "coupled run finished");
        Ok(finish(result, Completion::Complete, self.time))
    }

    /// Sets inputs, steps, and reads outputs of one member.
    ///
    /// Returns true if the component ended the simulation.
    fn step_member(&mut self, index: usize, t_end: f64) -> Result<bool, CouplingError> {
        let assignments: Vec<(ValueRef, Value)> = self.members[index]
            .inputs
            .iter()
            .filter_map(|&(slot, value_ref, _)| {
                self.values[slot].as_ref().map(|value| (value_ref, value.clone()))
            })
            .collect();

        let member = &mut self.members[index];
        let terminated = member
            .advance(&assignments, t_end)
            .map_err(|source| member.failure(source))?;

        self.read_outputs(index)?;
        Ok(terminated)
    }

    fn read_outputs(&mut self, index: usize) -> Result<(), CouplingError> {
        let member = &mut self.members[index];
        if member.outputs.is_empty() {
            return Ok(());
        }
        let requests: Vec<(ValueRef, ValueKind)> = member
            .outputs
            .iter()
            .map(|&(_, value_ref, kind)| (value_ref, kind))
            .collect();
        let read = member.instance.variables().get_batch(&requests);
        let values = read.map_err(|err| member.failure(err.into()))?;
        for (&(slot, _, _), value) in member.outputs.iter().zip(values) {
            self.values[slot] = Some(value);
        }
        Ok(())
    }

    fn apply_inputs(&mut self, inputs: &ExternalInputs, time: f64) {
        for (name, value) in inputs.values_at(time) {
            if let Some(&slot) = self.flat.inputs.get(name) {
                self.values[slot] = Some(value);
            }
        }
    }

    /// Copies every connection's start value to its end.
    fn propagate(&mut self) {
        for connection in &self.flat.connections {
            if let Some(value) = &self.values[connection.from] {
                self.values[connection.to] = Some(connection.carry(value));
            }
        }
    }

    fn record<O>(
        &self,
        result: &mut SimulationResult,
        observer: &mut O,
    ) -> Result<ControlFlow<Completion>, CouplingError>
    where
        O: Observer<RunEvent, Action>,
    {
        let row = Row::new(self.time, self.row_values());
        result.push(row.clone()).map_err(|err| SimulationError {
            instance: self.flat.name.clone(),
            last_time: Some(self.time),
            source: err.into(),
        })?;
        Ok(match observer.observe(&RunEvent::Row(row)) {
            Some(Action::StopEarly) => ControlFlow::Break(Completion::StoppedByObserver),
            None => ControlFlow::Continue(()),
        })
    }

    fn check_timeout(&self, started: Instant, timeout: Option<Duration>) -> Result<(), CouplingError> {
        match timeout {
            Some(limit) if started.elapsed() > limit => Err(SimulationError {
                instance: self.flat.name.clone(),
                last_time: Some(self.time),
                source: RunError::Timeout {
                    limit,
                    time: self.time,
                },
            }
            .into()),
            _ => Ok(()),
        }
    }

    /// Current value of every connector, in column order. Values that are
    /// not yet known or not numeric read as `NaN`.
    #[must_use]
    pub fn row_values(&self) -> Vec<f64> {
        self.values
            .iter()
            .map(|value| value.as_ref().and_then(Value::as_f64).unwrap_or(f64::NAN))
            .collect()
    }

    /// Current value of the connector at `path`.
    #[must_use]
    pub fn value(&self, path: &str) -> Option<&Value> {
        let slot = self.flat.slots.iter().position(|slot| slot.path == path)?;
        self.values[slot].as_ref()
    }

    /// Dotted connector paths, in column order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.flat.slots.iter().map(|slot| slot.path.as_str())
    }

    /// Component paths in instantiation order.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.members
            .iter()
            .map(|member| self.flat.components[member.component].path.as_str())
    }

    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Terminates and frees every instance in reverse instantiation order,
    /// then releases the archive.
    ///
    /// Continues past failures and returns the first. Calling it again does
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns the first teardown or release failure.
    pub fn teardown(&mut self) -> Result<(), CouplingError> {
        self.torn_down = true;
        let mut first = None;

        while let Some(mut member) = self.members.pop() {
            let component = &self.flat.components[member.component].path;
            if let Err(source) = run::teardown(&mut member.instance) {
                tracing::warn!(component = %component, error = %source, "teardown failed");
                first.get_or_insert(CouplingError::Teardown {
                    component: component.clone(),
                    source,
                });
            } else {
                tracing::debug!(component = %component, "torn down");
            }
        }
        self.step_order.clear();

        if let Some(mut archive) = self.archive.take()
            && let Err(source) = archive.release()
        {
            tracing::warn!(system = %self.flat.name, error = %source, "failed to release archive");
            first.get_or_insert(CouplingError::Release(source));
        }

        first.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for CoupledSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoupledSystem")
            .field("name", &self.flat.name)
            .field("archive", &self.archive)
            .field("time", &self.time)
            .field("torn_down", &self.torn_down)
            .finish_non_exhaustive()
    }
}

impl Drop for CoupledSystem {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            tracing::warn!(system = %self.flat.name, error = %err, "teardown on drop failed");
        }
    }
}

impl Member {
    /// Binds parameters, then initializes with the inputs known at the
    /// start time.
    fn initialize(
        &mut self,
        bindings: &[(String, Value)],
        inputs: &[(ValueRef, Value)],
        config: &SimulationConfig,
    ) -> Result<(), RunError> {
        let instance = &mut self.instance;
        if !bindings.is_empty() {
            instance.variables().set_start_values(bindings)?;
        }
        instance.setup_experiment(config.tolerance, config.start_time, Some(config.stop_time))?;
        instance.enter_initialization_mode()?;
        if !inputs.is_empty() {
            instance.variables().set_batch(inputs)?;
        }
        instance.exit_initialization_mode()?;
        self.driver.start(instance, config.start_time)?;
        Ok(())
    }

    fn advance(&mut self, assignments: &[(ValueRef, Value)], t_end: f64) -> Result<bool, RunError> {
        if !assignments.is_empty() {
            self.instance.variables().set_batch(assignments)?;
        }
        let progress = self
            .driver
            .step(&mut self.instance, t_end, None)
            .map_err(|err| RunError::from_step(err, self.timeout))?;
        Ok(progress.terminated)
    }

    fn failure(&self, source: RunError) -> CouplingError {
        SimulationError {
            instance: self.instance.name().to_owned(),
            last_time: self.instance.last_time(),
            source,
        }
        .into()
    }
}

fn finish(result: SimulationResult, status: Completion, final_time: f64) -> Outcome {
    Outcome {
        result,
        events: Vec::new(),
        status,
        final_time,
    }
}
