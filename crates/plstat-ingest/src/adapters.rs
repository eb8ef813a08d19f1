//! Format adapters: one fragment per input file kind.
//!
//! Every adapter reads one file, closes it, and returns a fragment in the
//! shared record schema. Markup and binary-table parsing happen upstream of
//! this tool; the report and table adapters consume the JSON renditions
//! those external steps produce.

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use plstat_merge::Fragment;
use plstat_model::{Group, LeafValue, Node, Scalar, Value};

use crate::error::{IngestError, IngestResult};

fn read_json<T: DeserializeOwned>(path: &Path) -> IngestResult<T> {
    let text = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| IngestError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// A parsed stats file: the MOUS fragment plus its sidecar header.
#[derive(Clone, Debug)]
pub struct StatsFile {
    pub fragment: Fragment,
    pub header: Option<serde_json::Value>,
}

/// Load a pipeline stats file.
///
/// The top level must contain exactly one key containing `"uid"`; that
/// nested object is the fragment. The MOUS uid itself only exists as that
/// key, so it is injected as a `mous_uid` leaf.
pub fn load_stats_file(path: &Path) -> IngestResult<StatsFile> {
    let doc: serde_json::Map<String, serde_json::Value> = read_json(path)?;
    let mous_keys: Vec<String> = doc
        .keys()
        .filter(|k| k.contains("uid"))
        .cloned()
        .collect();
    let [mous_key] = mous_keys.as_slice() else {
        return Err(IngestError::Schema {
            path: path.to_path_buf(),
            candidates: mous_keys,
        });
    };

    let mut fragment: Group =
        serde_json::from_value(doc[mous_key].clone()).map_err(|source| IngestError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    fragment.insert("mous_uid".into(), Node::Leaf(LeafValue::str(mous_key)));

    Ok(StatsFile {
        fragment,
        header: doc.get("header").cloned(),
    })
}

/// JSON rendition of the aggregate quality report, as produced by the
/// upstream report conversion. Field names mirror the report elements.
#[derive(Debug, Deserialize)]
struct ReportDoc {
    #[serde(rename = "ProposalCode")]
    proposal_code: Option<Scalar>,
    #[serde(rename = "ProcessingProcedure")]
    pipeline_recipe: Option<Scalar>,
    #[serde(rename = "OusEntityId")]
    project_id: Option<Scalar>,
    #[serde(rename = "OusStatusEntityId")]
    mous_uid: Option<Scalar>,
    #[serde(rename = "ProcessingTime")]
    total_time: Option<Scalar>,
    #[serde(rename = "CasaVersion")]
    casa_version: Option<Scalar>,
    #[serde(rename = "PipelineVersion")]
    pipeline_version: Option<Scalar>,
    #[serde(rename = "QaPerStage", default)]
    stages: Vec<ReportStage>,
}

#[derive(Debug, Deserialize)]
struct ReportStage {
    #[serde(rename = "Number")]
    number: Scalar,
    #[serde(rename = "Name")]
    name: Scalar,
    #[serde(rename = "Score")]
    score: Option<Scalar>,
}

/// Per-stage timings from the timetracker file.
#[derive(Debug, Deserialize)]
struct TimingDoc {
    #[serde(default)]
    stages: BTreeMap<String, StageTiming>,
}

#[derive(Debug, Deserialize)]
struct StageTiming {
    task_time: Option<f64>,
    result_time: Option<f64>,
    total_time: Option<f64>,
}

/// Load the aggregate report (JSON rendition), optionally folding in the
/// per-stage timings from a timetracker file.
pub fn load_report_file(path: &Path, timing: Option<&Path>) -> IngestResult<Fragment> {
    let doc: ReportDoc = read_json(path)?;
    let mut fragment = Group::new();

    let scalars = [
        ("proposal_code", doc.proposal_code),
        ("pipeline_recipe", doc.pipeline_recipe),
        ("project_id", doc.project_id),
        ("mous_uid", doc.mous_uid),
        ("total_time", doc.total_time),
        ("casa_version", doc.casa_version),
        ("pipeline_version", doc.pipeline_version),
    ];
    for (field, value) in scalars {
        if let Some(value) = value {
            fragment.insert(field.into(), Node::Leaf(LeafValue::new(Value::Scalar(value))));
        }
    }

    let mut stage_group = Group::new();
    for stage in doc.stages {
        let mut entry = Group::new();
        entry.insert(
            "stage_name".into(),
            Node::Leaf(LeafValue::new(Value::Scalar(stage.name))),
        );
        if let Some(score) = stage.score {
            entry.insert("qa_score".into(), Node::Leaf(LeafValue::new(Value::Scalar(score))));
        }
        stage_group.insert(stage.number.to_string(), Node::Group(entry));
    }
    if let Some(timing) = timing {
        let timing_doc: TimingDoc = read_json(timing)?;
        for (number, times) in timing_doc.stages {
            let entry = stage_group
                .entry(number)
                .or_insert_with(Node::group);
            let Some(entry) = entry.as_group_mut() else { continue };
            let fields = [
                ("task_time", times.task_time),
                ("result_time", times.result_time),
                ("total_time", times.total_time),
            ];
            for (field, value) in fields {
                if let Some(value) = value {
                    entry.insert(field.into(), Node::Leaf(LeafValue::float(value)));
                }
            }
        }
    }
    if !stage_group.is_empty() {
        fragment.insert("STAGE".into(), Node::Group(stage_group));
    }
    Ok(fragment)
}

/// Load a supplemental stats file: `EB`/`TARGET` groups of per-image
/// statistics, already in record schema.
pub fn load_suppl_file(path: &Path) -> IngestResult<Fragment> {
    read_json(path)
}

/// Load a calibration-table summary: per-EB, per-stage, per-version column
/// sums and flag counts, already keyed by EB name.
pub fn load_table_file(path: &Path) -> IngestResult<Fragment> {
    read_json(path)
}
