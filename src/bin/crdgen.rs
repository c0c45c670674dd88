use anyhow::Context;
use kube::CustomResourceExt;
use network_status::crd::{ClusterOperator, MachineConfig, MachineConfigPool, Network};

fn main() -> anyhow::Result<()> {
    let crds = [
        ClusterOperator::crd(),
        Network::crd(),
        MachineConfig::crd(),
        MachineConfigPool::crd(),
    ];
    for crd in &crds {
        let name = crd.metadata.name.as_deref().unwrap_or_default();
        let yaml =
            serde_yaml::to_string(crd).with_context(|| format!("failed to render CRD {}", name))?;
        println!("---");
        print!("{}", yaml);
    }
    Ok(())
}
