//! One-shot entry point for running a backup cycle outside Lambda, sharing
//! the Lambda handler's wiring. Prints the run report to stdout.

use ebs_backup_lambda::adapters::ec2::Ec2ResourceRepository;
use ebs_backup_lambda::handlers::backup::run_backup;
use lambda_runtime::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let repository = Ec2ResourceRepository::new(aws_sdk_ec2::Client::new(&config));

    let region_label = std::env::var("BACKUP_REGION_LABEL").ok();

    let report = run_backup(&repository, region_label.as_deref())
        .map_err(|error| Error::from(error.to_message()))?;

    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
