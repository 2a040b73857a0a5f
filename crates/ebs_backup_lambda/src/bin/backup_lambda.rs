use ebs_backup_lambda::adapters::ec2::Ec2ResourceRepository;
use ebs_backup_lambda::handlers::backup::{run_backup, BackupRunReport};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

async fn handle_request(_event: LambdaEvent<Value>) -> Result<BackupRunReport, Error> {
    let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let repository = Ec2ResourceRepository::new(aws_sdk_ec2::Client::new(&config));

    let region_label = std::env::var("BACKUP_REGION_LABEL").ok();

    run_backup(&repository, region_label.as_deref())
        .map_err(|error| Error::from(error.to_message()))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}
