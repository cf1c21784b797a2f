//! Python bindings.
//!
//! Configuration crosses the boundary as a JSON string so the Python side can
//! keep its experiment settings in whatever form it likes. Tensors come back
//! as numpy arrays; f32 for observations and stored parameters, f64 for
//! everything handed to the trainer.

use std::path::PathBuf;

use ndarray::ArrayD;
use numpy::{
    IntoPyArray, PyArray1, PyArray2, PyArray3, PyArray4, PyArray5, PyArrayDyn,
    PyReadonlyArray1, PyReadonlyArrayDyn,
};
use pyo3::exceptions::{PyIOError, PyKeyError, PyTimeoutError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use pyo3::wrap_pyfunction;

use crate::config::ExperimentConfig;
use crate::configurator::Configurator;
use crate::dataset::DatasetAssembler;
use crate::error::Error;
use crate::prior::{UniformPrior, DEFAULT_MOMENT_DRAWS};
use crate::simulator::SimulationRunner;

fn to_py_err(err: Error) -> PyErr {
    match err {
        Error::Io { .. } | Error::Launch { .. } => PyIOError::new_err(err.to_string()),
        Error::SimulationTimeout { .. } => PyTimeoutError::new_err(err.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

fn parse_config(config_json: &str) -> PyResult<ExperimentConfig> {
    ExperimentConfig::from_json_str(config_json).map_err(to_py_err)
}

/// Accept float64 or float32 arrays of any rank.
fn extract_f64(obj: &PyAny) -> PyResult<ArrayD<f64>> {
    if let Ok(array) = obj.extract::<PyReadonlyArrayDyn<f64>>() {
        return Ok(array.as_array().to_owned());
    }
    let array = obj.extract::<PyReadonlyArrayDyn<f32>>()?;
    Ok(array.as_array().mapv(f64::from))
}

fn dict_item<'py>(dict: &'py PyDict, key: &str) -> PyResult<&'py PyAny> {
    dict.get_item(key)?
        .ok_or_else(|| PyKeyError::new_err(key.to_string()))
}

/// Default configuration as pretty-printed JSON.
#[pyfunction]
fn default_config_json() -> PyResult<String> {
    serde_json::to_string_pretty(&ExperimentConfig::default())
        .map_err(|e| PyValueError::new_err(e.to_string()))
}

/// Raise `ValueError` if the configuration is malformed or inconsistent.
#[pyfunction]
fn validate_config_json(config_json: &str) -> PyResult<()> {
    parse_config(config_json).map(|_| ())
}

/// Read every run below the output folder into `(observations, parameters)`.
///
/// # Arguments
/// * `config_json` - Experiment configuration
/// * `workdir` - Receives `log_read_offline.txt` and `rejected_runs.json`
/// * `pattern` - Run directory glob, defaults to `<data_path>/<folder>/*`
///
/// # Returns
/// * `(n, T, 4)` float32 observations and `(n, n_params)` float32 parameters
#[pyfunction]
#[pyo3(signature = (config_json, workdir, pattern=None))]
fn read_offline_data<'py>(
    py: Python<'py>,
    config_json: &str,
    workdir: PathBuf,
    pattern: Option<String>,
) -> PyResult<(&'py PyArray3<f32>, &'py PyArray2<f32>)> {
    let config = parse_config(config_json)?;
    let pattern = pattern.unwrap_or_else(|| config.offline_pattern());
    let dataset = py
        .allow_threads(|| DatasetAssembler::new(&config).assemble_scalar(&pattern, &workdir))
        .map_err(to_py_err)?;
    Ok((
        dataset.observations.into_pyarray(py),
        dataset.parameters.into_pyarray(py),
    ))
}

/// Lattice variant of `read_offline_data`: `(n, H, W, T, 3)` observations.
#[pyfunction]
#[pyo3(signature = (config_json, workdir, pattern=None))]
fn read_offline_data_2d<'py>(
    py: Python<'py>,
    config_json: &str,
    workdir: PathBuf,
    pattern: Option<String>,
) -> PyResult<(&'py PyArray5<f32>, &'py PyArray2<f32>)> {
    let config = parse_config(config_json)?;
    let pattern = pattern.unwrap_or_else(|| config.offline_pattern());
    let dataset = py
        .allow_threads(|| DatasetAssembler::new(&config).assemble_spatial(&pattern, &workdir))
        .map_err(to_py_err)?;
    Ok((
        dataset.observations.into_pyarray(py),
        dataset.parameters.into_pyarray(py),
    ))
}

/// Simulate one draw (prior order) and return its `(T, 4)` observation.
#[pyfunction]
fn run_simulation<'py>(
    py: Python<'py>,
    config_json: &str,
    params: Vec<f64>,
    workdir: PathBuf,
) -> PyResult<&'py PyArray2<f32>> {
    let config = parse_config(config_json)?;
    let observation = py
        .allow_threads(|| SimulationRunner::new(&config, workdir).run(&params))
        .map_err(to_py_err)?;
    Ok(observation.into_pyarray(py))
}

/// Simulate one draw and return its `(H, W, T, 3)` lattices.
#[pyfunction]
fn run_simulation_2d<'py>(
    py: Python<'py>,
    config_json: &str,
    params: Vec<f64>,
    workdir: PathBuf,
) -> PyResult<&'py PyArray4<f32>> {
    let config = parse_config(config_json)?;
    let observation = py
        .allow_threads(|| SimulationRunner::new(&config, workdir).run_2d(&params))
        .map_err(to_py_err)?;
    Ok(observation.into_pyarray(py))
}

/// `(n, n_params)` seeded prior draws.
#[pyfunction]
#[pyo3(signature = (config_json, n, seed=0))]
fn sample_prior<'py>(
    py: Python<'py>,
    config_json: &str,
    n: usize,
    seed: u64,
) -> PyResult<&'py PyArray2<f64>> {
    let config = parse_config(config_json)?;
    let prior = UniformPrior::from_config(&config).map_err(to_py_err)?;
    Ok(prior.sample_batch(n, seed).into_pyarray(py))
}

/// Monte-Carlo `(means, stds)` of the prior, for standardizing parameters.
#[pyfunction]
#[pyo3(signature = (config_json, n=DEFAULT_MOMENT_DRAWS, seed=0))]
fn estimate_prior_moments<'py>(
    py: Python<'py>,
    config_json: &str,
    n: usize,
    seed: u64,
) -> PyResult<(&'py PyArray1<f64>, &'py PyArray1<f64>)> {
    let config = parse_config(config_json)?;
    let prior = UniformPrior::from_config(&config).map_err(to_py_err)?;
    let (means, stds) = prior.estimate_means_and_stds(n, seed).map_err(to_py_err)?;
    Ok((means.into_pyarray(py), stds.into_pyarray(py)))
}

/// Configure a forward dict `{prior_draws, sim_data}` for the trainer.
///
/// # Returns
/// * Dict with standardized float64 `parameters` and `summary_conditions`
///   holding `log1p(sim_data)`
#[pyfunction]
fn prepare_input<'py>(
    py: Python<'py>,
    forward_dict: &PyDict,
    prior_means: PyReadonlyArray1<f64>,
    prior_stds: PyReadonlyArray1<f64>,
) -> PyResult<&'py PyDict> {
    let configurator = Configurator::new(
        prior_means.as_array().to_owned(),
        prior_stds.as_array().to_owned(),
    )
    .map_err(to_py_err)?;

    let prior_draws = extract_f64(dict_item(forward_dict, "prior_draws")?)?
        .into_dimensionality::<ndarray::Ix2>()
        .map_err(|e| PyValueError::new_err(format!("prior_draws: {e}")))?;
    let sim_data = extract_f64(dict_item(forward_dict, "sim_data")?)?;

    let configured = configurator
        .prepare_input(prior_draws.view(), sim_data.view())
        .map_err(to_py_err)?;

    let out = PyDict::new(py);
    out.set_item("parameters", configured.parameters.into_pyarray(py))?;
    let summary: &PyArrayDyn<f64> = configured.summary_conditions.into_pyarray(py);
    out.set_item("summary_conditions", summary)?;
    Ok(out)
}

#[pymodule]
fn morpheus_sbi_rust(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(default_config_json, m)?)?;
    m.add_function(wrap_pyfunction!(validate_config_json, m)?)?;
    m.add_function(wrap_pyfunction!(read_offline_data, m)?)?;
    m.add_function(wrap_pyfunction!(read_offline_data_2d, m)?)?;
    m.add_function(wrap_pyfunction!(run_simulation, m)?)?;
    m.add_function(wrap_pyfunction!(run_simulation_2d, m)?)?;
    m.add_function(wrap_pyfunction!(sample_prior, m)?)?;
    m.add_function(wrap_pyfunction!(estimate_prior_moments, m)?)?;
    m.add_function(wrap_pyfunction!(prepare_input, m)?)?;
    Ok(())
}
