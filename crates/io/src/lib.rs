#![forbid(unsafe_code)]

use anyhow::{anyhow, Context, Result};
use conicrs_api::Solution;
use conicrs_core::math::Scalar;
use conicrs_core::problem::{LpProblem, Problem, QpProblem, SocpProblem};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JsonProblem {
    Lp { problem: LpProblem<Scalar> },
    Qp { problem: QpProblem<Scalar> },
    Socp { problem: SocpProblem<Scalar> },
}

impl JsonProblem {
    pub fn into_problem(self) -> Problem<Scalar> {
        match self {
            JsonProblem::Lp { problem } => Problem::Lp(problem),
            JsonProblem::Qp { problem } => Problem::Qp(problem),
            JsonProblem::Socp { problem } => Problem::Socp(problem),
        }
    }
}

impl From<Problem<Scalar>> for JsonProblem {
    fn from(problem: Problem<Scalar>) -> Self {
        match problem {
            Problem::Lp(problem) => JsonProblem::Lp { problem },
            Problem::Qp(problem) => JsonProblem::Qp { problem },
            Problem::Socp(problem) => JsonProblem::Socp { problem },
        }
    }
}

/// Parses a problem file. Shapes and finiteness are validated during deserialization.
pub fn parse_json_problem(contents: &str) -> Result<JsonProblem> {
    match serde_json::from_str::<JsonProblem>(contents) {
        Ok(problem) => Ok(problem),
        Err(parse_err) => {
            if serde_json::from_str::<Solution<Scalar>>(contents).is_ok() {
                Err(anyhow!(
                    "JSON file contains a solver solution, but a conicrs problem (with a 'kind' of lp, qp or socp) was expected."
                ))
            } else {
                Err(parse_err).context("failed to parse JSON problem")
            }
        }
    }
}

pub fn read_json_problem<P: AsRef<Path>>(path: P) -> Result<JsonProblem> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
    let mut reader = BufReader::new(file);
    let mut contents = String::new();
    reader
        .read_to_string(&mut contents)
        .with_context(|| format!("failed to read {:?}", path))?;
    parse_json_problem(&contents).with_context(|| format!("invalid problem file {:?}", path))
}

pub fn write_json_problem<P: AsRef<Path>>(path: P, problem: &JsonProblem) -> Result<()> {
    let file = File::create(path.as_ref())
        .with_context(|| format!("failed to create {:?}", path.as_ref()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, problem).context("failed to serialise problem")?;
    writer.flush().context("failed to flush problem file")?;
    Ok(())
}

pub fn write_solution<P: AsRef<Path>>(path: P, solution: &Solution<Scalar>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create parent directory {:?}", parent))?;
        }
    }

    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, solution).context("failed to serialise solution")?;
    writer
        .flush()
        .with_context(|| format!("failed to write solution into {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conicrs_api::{Method, Solver};

    const LP: &str = r#"{"kind":"lp","problem":{"cost":[-3.0,-5.0],"constraints":{
        "less_equal":{"matrix":{"nrows":3,"ncols":2,"data":[1.0,0.0,0.0,2.0,3.0,2.0]},"rhs":[4.0,12.0,18.0]},
        "bounds":{"lower":[0.0,0.0],"upper":[null,null]}}}}"#;

    #[test]
    fn parses_tagged_lp() {
        let problem = parse_json_problem(LP).expect("parse").into_problem();
        assert_eq!(problem.kind(), "lp");
        assert_eq!(problem.nvars(), 2);
    }

    #[test]
    fn rejects_inconsistent_shapes() {
        let bad = LP.replace("\"nrows\":3", "\"nrows\":2");
        assert!(parse_json_problem(&bad).is_err());
    }

    #[test]
    fn solution_file_is_not_a_problem() {
        let problem = parse_json_problem(LP).expect("parse").into_problem();
        let solution = Solver::new()
            .method(Method::Simplex)
            .solve(&problem)
            .expect("solve");
        let text = serde_json::to_string(&solution).expect("serialize");
        let err = parse_json_problem(&text).unwrap_err();
        assert!(err.to_string().contains("solver solution"));
    }

    #[test]
    fn files_round_trip_through_disk() {
        let dir = std::env::temp_dir().join(format!("conicrs-io-{}", std::process::id()));
        let problem_path = dir.join("problem.json");
        let solution_path = dir.join("out").join("solution.json");
        fs::create_dir_all(&dir).expect("dir");

        let problem = parse_json_problem(LP).expect("parse");
        write_json_problem(&problem_path, &problem).expect("write problem");
        let back = read_json_problem(&problem_path).expect("read problem").into_problem();
        let solution = Solver::new()
            .method(Method::Simplex)
            .solve(&back)
            .expect("solve");
        write_solution(&solution_path, &solution).expect("write solution");
        assert!(solution_path.exists());
        fs::remove_dir_all(&dir).ok();
    }
}
