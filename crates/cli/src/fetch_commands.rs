use {
    anyhow::bail,
    linkfetch_common::{DeliveryTarget, parse_request_url},
    linkfetch_config::LinkfetchConfig,
    linkfetch_media::{Orchestrator, Requester, RetrievalOutcome, delivery},
};

/// Retrieve one URL with no messaging collaborator attached.
///
/// Direct send needs Telegram, so direct links go straight to the HTTP
/// download. The file is deleted afterwards unless `keep` is set.
pub async fn fetch(
    config: &LinkfetchConfig,
    orchestrator: &Orchestrator,
    input: &str,
    keep: bool,
) -> anyhow::Result<()> {
    let url = parse_request_url(input)?;
    let target = DeliveryTarget::new(0);
    let request = orchestrator.request(url);

    match orchestrator
        .retrieve(&request, Requester::detached(&target))
        .await
    {
        RetrievalOutcome::Success(artifact) => {
            println!("Retrieved:    {}", artifact.path.display());
            println!("Content type: {}", artifact.content_type);
            println!(
                "Size:         {:.2} MB",
                artifact.size_bytes as f64 / (1024.0 * 1024.0)
            );
            match delivery::plan(
                &artifact,
                config.delivery.inline_limit_bytes(),
                config.delivery.absolute_limit_bytes(),
            ) {
                Ok(plan) => println!("Delivery:     {:?} as {}", plan.channel, plan.kind),
                Err(failure) => println!("Delivery:     {}", failure.user_message()),
            }
            if keep {
                println!("Kept.");
            } else {
                orchestrator
                    .janitor()
                    .remove_artifact(&artifact.path)
                    .await;
            }
            Ok(())
        },
        RetrievalOutcome::Forwarded { kind } => {
            println!("Forwarded as {kind}; nothing stored locally.");
            Ok(())
        },
        RetrievalOutcome::Failure(failure) => bail!("{}", failure.user_message()),
    }
}
