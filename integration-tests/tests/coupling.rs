use std::{path::Path, sync::Arc};

use approx::assert_abs_diff_eq;
use integration_tests::test_components::signals::{Gain, Sine};
use parking_lot::Mutex;
use tandem_core::{Row, Value};
use tandem_simulate::{
    Action, Completion, CoupledSystem, CouplingError, ExternalInputs, RunEvent, SimulationConfig,
    SystemDescriptor,
    coupling::{
        ArchiveExtractor, CollaboratorError, ComponentElement, ComponentLoader, Connection,
        Connector, ExtractedArchive, LoadedComponent,
    },
};

/// Serves archives from a fixed directory and counts releases.
#[derive(Default)]
struct Directory {
    released: Arc<Mutex<usize>>,
}

impl ArchiveExtractor for Directory {
    fn extract(&mut self, _: &str) -> Result<ExtractedArchive, CollaboratorError> {
        let released = Arc::clone(&self.released);
        Ok(ExtractedArchive::with_release("/srv/plant", move || {
            *released.lock() += 1;
            Ok(())
        }))
    }
}

/// Maps component sources to the in-process components.
#[derive(Default)]
struct Catalog {
    gain: Gain,
}

impl ComponentLoader for Catalog {
    fn load(&mut self, root: &Path, element: &ComponentElement) -> Result<LoadedComponent, CollaboratorError> {
        assert_eq!(root, Path::new("/srv/plant"));
        match element.source.as_str() {
            "resources/sine.fmu" => Ok(LoadedComponent::new(
                Arc::new(Sine::description()),
                Box::new(Sine::default()),
            )),
            "resources/gain.fmu" => Ok(LoadedComponent::new(
                Arc::new(Gain::description()),
                Box::new(self.gain.clone()),
            )),
            other => Err(format!("no component at {other}").into()),
        }
    }
}

/// `src.y` feeds `gain.u` through `2x + 1`, and the gain is three.
fn plant() -> SystemDescriptor {
    SystemDescriptor::new("plant")
        .with_connector(Connector::real_output("y"))
        .with_element(ComponentElement::new("src", "resources/sine.fmu").with_connector(Connector::real_output("y")))
        .with_element(
            ComponentElement::new("gain", "resources/gain.fmu")
                .with_connector(Connector::real_input("u"))
                .with_connector(Connector::real_output("y"))
                .with_binding("k", Value::Real(3.0)),
        )
        .with_connection(Connection::new("src", "y", "gain", "u").transformed(2.0, 1.0))
        .with_connection(Connection::to_boundary("gain", "y", "y"))
}

fn config() -> SimulationConfig {
    SimulationConfig {
        stop_time: 1.0,
        step_size: 0.1,
        ..SimulationConfig::default()
    }
}

#[test]
fn sine_drives_a_gain_through_a_transformed_connection() {
    let mut extractor = Directory::default();
    let mut loader = Catalog::default();
    let config = config();

    let mut system = CoupledSystem::instantiate(&plant(), "plant.ssp", &mut extractor, &mut loader, &config).unwrap();
    let outcome = system.run(&config, &ExternalInputs::new(), ()).unwrap();

    assert_eq!(outcome.status, Completion::Complete);
    assert_eq!(outcome.result.len(), 11);
    let result = &outcome.result;
    let src = result.column("src.y").unwrap();
    let u = result.column("gain.u").unwrap();
    let y = result.column("gain.y").unwrap();
    let boundary = result.column("y").unwrap();

    for (i, time) in result.times().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let expected = i as f64 * 0.1;
        assert_abs_diff_eq!(time, expected, epsilon = 1e-12);
        assert_abs_diff_eq!(src[i], time.sin(), epsilon = 1e-12);
        assert_abs_diff_eq!(u[i], 2.0 * time.sin() + 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(boundary[i], y[i]);
    }
    // The gain steps with the input it had at the start of each macro step.
    for i in 1..result.len() {
        assert_abs_diff_eq!(y[i], 3.0 * u[i - 1], epsilon = 1e-12);
    }

    system.teardown().unwrap();
    assert_eq!(*extractor.released.lock(), 1);
    let log = loader.gain.log.lock();
    assert_eq!(log.iter().filter(|&&call| call == "do_step").count(), 10);
    assert!(log.ends_with(&["terminate", "free_instance"]));
}

#[test]
fn observer_receives_rows_as_the_system_records_them() {
    let mut extractor = Directory::default();
    let mut loader = Catalog::default();
    let config = config();
    let rows = Arc::new(Mutex::new(Vec::<Row>::new()));
    let seen = Arc::clone(&rows);
    let observer = move |event: &RunEvent| -> Option<Action> {
        if let RunEvent::Row(row) = event {
            seen.lock().push(row.clone());
        }
        None
    };

    let mut system = CoupledSystem::instantiate(&plant(), "plant.ssp", &mut extractor, &mut loader, &config).unwrap();
    let outcome = system.run(&config, &ExternalInputs::new(), observer).unwrap();

    assert_eq!(rows.lock().as_slice(), outcome.result.rows());
}

#[test]
fn unknown_component_source_fails_before_running() {
    let plant = plant().with_element(ComponentElement::new("extra", "resources/missing.fmu"));
    let mut extractor = Directory::default();

    let err = CoupledSystem::instantiate(&plant, "plant.ssp", &mut extractor, &mut Catalog::default(), &config())
        .unwrap_err();

    assert!(matches!(&err, CouplingError::Load { component, .. } if component == "extra"));
    assert_eq!(*extractor.released.lock(), 1);
}

#[test]
fn descriptor_reads_from_json() {
    let json = r#"{
        "name": "plant",
        "connectors": [{ "name": "y", "kind": "output", "type": "real" }],
        "elements": [
            {
                "type": "component",
                "name": "src",
                "source": "resources/sine.fmu",
                "connectors": [{ "name": "y", "kind": "output", "type": "real" }]
            },
            {
                "type": "component",
                "name": "gain",
                "source": "resources/gain.fmu",
                "connectors": [
                    { "name": "u", "kind": "input", "type": "real" },
                    { "name": "y", "kind": "output", "type": "real" }
                ],
                "parameter_bindings": [{ "name": "k", "value": 3.0 }]
            }
        ],
        "connections": [
            {
                "start_element": "src",
                "start_connector": "y",
                "end_element": "gain",
                "end_connector": "u",
                "transformation": { "factor": 2.0, "offset": 1.0 }
            },
            { "start_element": "gain", "start_connector": "y", "end_connector": "y" }
        ]
    }"#;

    let descriptor: SystemDescriptor = serde_json::from_str(json).unwrap();

    assert_eq!(descriptor, plant());
}
