use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{AverageFrequency, NormalizedId, Window};

pub const SUBSET_STEP: &str = "subset";
pub const AVERAGE_STEP: &str = "average";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub doc: String,
    pub inputs: BTreeMap<String, Vec<String>>,
    pub outputs: BTreeMap<String, String>,
    pub steps: BTreeMap<String, Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub run: String,
    #[serde(rename = "in")]
    pub inputs: BTreeMap<String, String>,
}

impl Workflow {
    pub fn subset_then_average(
        variable_id: &str,
        dataset: &NormalizedId,
        window: &Window,
        frequency: AverageFrequency,
    ) -> Self {
        let subset = Step {
            run: "subset".to_string(),
            inputs: BTreeMap::from([
                ("collection".to_string(), format!("inputs/{variable_id}")),
                ("time".to_string(), window.time_range()),
                ("area".to_string(), window.area()),
            ]),
        };
        let average = Step {
            run: "average_time".to_string(),
            inputs: BTreeMap::from([
                ("collection".to_string(), format!("{SUBSET_STEP}/output")),
                ("freq".to_string(), frequency.as_str().to_string()),
            ]),
        };

        Self {
            doc: format!("{variable_id} subset of {dataset} averaged by {frequency}"),
            inputs: BTreeMap::from([(variable_id.to_string(), vec![dataset.to_string()])]),
            outputs: BTreeMap::from([("output".to_string(), format!("{AVERAGE_STEP}/output"))]),
            steps: BTreeMap::from([
                (SUBSET_STEP.to_string(), subset),
                (AVERAGE_STEP.to_string(), average),
            ]),
        }
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    pub fn step_input(&self, step: &str, key: &str) -> Option<&str> {
        self.step(step)
            .and_then(|step| step.inputs.get(key))
            .map(String::as_str)
    }

    pub fn dataset_ids(&self) -> impl Iterator<Item = &str> {
        self.inputs.values().flatten().map(String::as_str)
    }
}
