//! `drover plan`: show which hosts a run would touch, in order

use super::TargetArgs;
use crate::config::DroverConfig;
use crate::error::CliResult;
use crate::output::{self, join_or_dash, OutputFormat};
use drover_deployment::{plan, Plan};
use drover_types::RolloutGoal;
use tabled::Tabled;

#[derive(Debug, Tabled)]
pub struct PlanRow {
    #[tabled(rename = "#")]
    pub order: usize,
    #[tabled(rename = "HOST")]
    pub host: String,
    #[tabled(rename = "TARGET")]
    pub target: String,
    #[tabled(rename = "TAGS")]
    pub tags: String,
    #[tabled(rename = "SLOTS")]
    pub slots: String,
}

pub fn rows(plan: &Plan) -> Vec<PlanRow> {
    plan.hosts
        .iter()
        .enumerate()
        .map(|(i, host)| PlanRow {
            order: i + 1,
            host: if host.build_only {
                format!("{} (build only)", host.name)
            } else {
                host.name.clone()
            },
            target: host.target().to_string(),
            tags: join_or_dash(&host.tags),
            slots: join_or_dash(&plan.slot_keys(host)),
        })
        .collect()
}

pub async fn execute(
    target: TargetArgs,
    config: &DroverConfig,
    goal: RolloutGoal,
    format: OutputFormat,
) -> CliResult<()> {
    let deployment = target.load_deployment(config).await?;
    let plan = plan(&deployment, &target.filter(), goal)?;
    output::print_output(rows(&plan), &plan, format)
}
