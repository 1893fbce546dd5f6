use kube::CustomResourceExt;
use canary_rollout_controller::crd::rollout::Rollout;

fn main() -> anyhow::Result<()> {
    let crd = Rollout::crd();
    println!("{}", serde_json::to_string_pretty(&crd)?);
    Ok(())
}
