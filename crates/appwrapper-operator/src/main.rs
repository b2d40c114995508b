//! Entry point: parses CLI arguments, then either prints the `AppWrapper` CRD YAML or runs the
//! reconciler and, unless disabled, the admission webhook server side by side.

use std::sync::Arc;

use appwrapper_controller::{
    client::Client as ControllerClient,
    reconciler::{self, Context as ReconcilerContext},
    webhook::{self, Context as WebhookContext},
};
use appwrapper_crd::{AppWrapper, constants::LABEL_OWNER};
use appwrapper_shared::crd::CustomResourceExt;
use appwrapper_webhook::{
    WebhookServer, WebhookServerOptions,
    webhooks::{MutatingWebhook, MutatingWebhookOptions, ValidatingWebhook},
};
use clap::{Args, Parser};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    Api, Client as KubeClient, ResourceExt,
    runtime::{Controller, reflector::ObjectRef, watcher},
};

const FIELD_MANAGER: &str = "appwrapper-operator";

#[derive(Debug, Parser)]
#[command(name = "appwrapper-operator", version, about)]
enum Command {
    /// Print the AppWrapper CustomResourceDefinition as YAML.
    Crd,

    /// Run the operator.
    Run(RunArguments),
}

#[derive(Debug, Args)]
struct RunArguments {
    /// Tracing filter directive, e.g. "info,appwrapper_controller=debug".
    #[arg(long, env = "APPWRAPPER_OPERATOR_LOG", default_value = "info")]
    log_filter: String,

    /// Namespace the queue manager's Workload objects are created in.
    #[arg(long, env, default_value = "appwrapper-system")]
    queue_manager_namespace: String,

    /// Address the webhook server binds to.
    #[arg(long, env, default_value = "0.0.0.0")]
    webhook_bind_address: std::net::IpAddr,

    /// Port the webhook server binds to.
    #[arg(long, env, default_value_t = 8443)]
    webhook_bind_port: u16,

    /// Name of the `Service` fronting the webhook server.
    #[arg(long, env, default_value = "appwrapper-operator-webhook")]
    webhook_service_name: String,

    /// Namespace of the `Service` fronting the webhook server.
    #[arg(long, env, default_value = "appwrapper-system")]
    webhook_namespace: String,
}

/// `ENABLE_WEBHOOKS` is read directly rather than through `clap`: only the literal value
/// `"false"` disables webhook registration, matching the legacy convention carried over from the
/// distilled deployment's admission-webhook toggle.
fn webhooks_enabled() -> bool {
    std::env::var("ENABLE_WEBHOOKS").as_deref() != Ok("false")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match Command::parse() {
        Command::Crd => {
            AppWrapper::print_yaml_schema(env!("CARGO_PKG_VERSION"))?;
        }
        Command::Run(args) => run(args).await?,
    }

    Ok(())
}

async fn run(args: RunArguments) -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(args.log_filter.clone()).init();

    let kube_client = KubeClient::try_default().await?;
    let client = ControllerClient::new(kube_client.clone(), FIELD_MANAGER);

    let controller = run_controller(client.clone(), args.queue_manager_namespace.clone());

    if webhooks_enabled() {
        let webhook_options = WebhookServerOptions::builder()
            .bind_address(args.webhook_bind_address, args.webhook_bind_port)
            .webhook_service_name(args.webhook_service_name.clone())
            .webhook_namespace(args.webhook_namespace.clone())
            .build();
        let webhook_server =
            build_webhook_server(client, kube_client, &args, webhook_options.clone()).await?;
        tokio::join!(controller, async {
            webhook_server.run(webhook_options).await
        })
        .1?;
    } else {
        controller.await;
    }

    Ok(())
}

async fn run_controller(client: ControllerClient, queue_manager_namespace: String) {
    let kube_client = client.as_kube_client();
    let api = Api::<AppWrapper>::all(kube_client.clone());
    let pods = Api::<Pod>::all(kube_client);
    let ctx = Arc::new(ReconcilerContext {
        client,
        queue_manager_namespace,
    });

    Controller::new(api, watcher::Config::default())
        .watches(pods, watcher::Config::default(), pod_to_wrapper)
        .run(reconciler::reconcile, reconciler::error_policy, ctx)
        .for_each(|_| async {})
        .await;
}

/// Maps any pod carrying the `owner` label to a reconcile of its owning `AppWrapper`, so every
/// phase transition of a child pod (not only `succeeded`) is observed promptly instead of
/// waiting out the slow requeue interval.
fn pod_to_wrapper(pod: Pod) -> Option<ObjectRef<AppWrapper>> {
    let namespace = pod.namespace()?;
    let owner = pod.labels().get(LABEL_OWNER)?;
    Some(ObjectRef::new(owner).within(&namespace))
}

async fn build_webhook_server(
    client: ControllerClient,
    kube_client: KubeClient,
    args: &RunArguments,
    webhook_options: WebhookServerOptions,
) -> anyhow::Result<WebhookServer> {
    let webhook_ctx = Arc::new(WebhookContext { client });

    let mwc_name = format!("{}.appwrapper.example.com", args.webhook_service_name);
    let vwc_name = format!("{}-validating.appwrapper.example.com", args.webhook_service_name);

    let mutating = Box::new(MutatingWebhook::new(
        webhook::configuration::mutating_webhook_configuration(&mwc_name),
        webhook::defaulting::mutate,
        webhook_ctx.clone(),
        kube_client.clone(),
        MutatingWebhookOptions {
            disable_mwc_maintenance: false,
            field_manager: FIELD_MANAGER.to_owned(),
        },
    ));

    let validating = Box::new(ValidatingWebhook::new(
        webhook::configuration::validating_webhook_configuration(&vwc_name),
        webhook::validation::validate,
        webhook_ctx,
        false,
        kube_client,
        FIELD_MANAGER.to_owned(),
    ));

    let server = WebhookServer::new(vec![mutating, validating], webhook_options).await?;
    Ok(server)
}
