//! Request handler definitions
//!
//! Define each route and its handler here. The handlers only read from, or hand work to, the shared
//! [`VendingPipeline`]; none of them wait for an order to be reconciled.
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, broker publishes, etc.) should be expressed as
//! futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don’t block
//! execution.
use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use log::*;
use vending_engine::{
    vm_types::{CorrelationToken, LogCategory, MachineCode, OrderIntent, OrderLine},
    MessagePublisher,
    VendingBackend,
    VendingPipeline,
};

use crate::{
    data_objects::{
        CommandRequest,
        DeviceDto,
        IntentAccepted,
        IntentRequest,
        IntentStatusDto,
        JsonResponse,
        LogQuery,
    },
    errors::ServerError,
    helpers::new_correlation_token,
    stats::{OutcomeStats, StatsSnapshot},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Devices  ----------------------------------------------------
route!(devices => Get "/devices" impl VendingBackend, MessagePublisher);
/// Route handler for the device snapshot.
///
/// Returns every device that has reported in, ordered by machine code. Liveness is evaluated at the time of the
/// request, so a device that has gone quiet shows up as not live even though nothing else about it has changed.
/// Long alerts are shortened for display.
pub async fn devices<B, P>(api: web::Data<VendingPipeline<B, P>>) -> Result<HttpResponse, ServerError>
where
    B: VendingBackend,
    P: MessagePublisher,
{
    trace!("💻️ GET devices");
    let devices = api.device_snapshot(Utc::now()).into_iter().map(DeviceDto::from).collect::<Vec<_>>();
    Ok(HttpResponse::Ok().json(devices))
}

route!(evict_device => Delete "/devices/{code}" impl VendingBackend, MessagePublisher);
/// Removes a device from the registry. Called by machine management when a machine is deleted.
pub async fn evict_device<B, P>(
    path: web::Path<String>,
    api: web::Data<VendingPipeline<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: VendingBackend,
    P: MessagePublisher,
{
    let code = path.into_inner().parse::<MachineCode>().map_err(|e| ServerError::InvalidRequestPath(e.to_string()))?;
    debug!("💻️ DELETE device {code}");
    match api.evict_device(&code) {
        Some(_) => Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Device {code} evicted")))),
        None => Err(ServerError::NoRecordFound(format!("Device {code} is not in the registry"))),
    }
}

//----------------------------------------------   Logs  ----------------------------------------------------
route!(logs => Get "/logs/{category}" impl VendingBackend, MessagePublisher);
/// Route handler for the message logs.
///
/// Returns the entries in a log category that arrived strictly after `since` (milliseconds since the Unix epoch,
/// default 0), oldest first. Pollers pass the timestamp of the last entry they saw to pick up where they left off.
/// With `limit`, only the most recent entries are returned.
pub async fn logs<B, P>(
    path: web::Path<String>,
    query: web::Query<LogQuery>,
    api: web::Data<VendingPipeline<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: VendingBackend,
    P: MessagePublisher,
{
    let category =
        path.into_inner().parse::<LogCategory>().map_err(|e| ServerError::InvalidRequestPath(e.to_string()))?;
    let LogQuery { since, limit } = query.into_inner();
    trace!("💻️ GET {category} log since {since}");
    let entries = api.log(category, since, limit);
    Ok(HttpResponse::Ok().json(entries))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(submit_order_intent => Post "/orders/intent" impl VendingBackend, MessagePublisher);
/// Publishes an order intent to the broker.
///
/// The intent is reconciled once it comes back through the broker subscription, so this handler returns
/// `202 Accepted` with the correlation token as soon as the publish succeeds. Clients poll
/// `/orders/intent/{token}` (or the outcome log) for the result.
pub async fn submit_order_intent<B, P>(
    body: web::Json<IntentRequest>,
    api: web::Data<VendingPipeline<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: VendingBackend,
    P: MessagePublisher,
{
    let request = body.into_inner();
    let token = match request.token {
        Some(t) => t.parse::<CorrelationToken>().map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?,
        None => new_correlation_token().map_err(|e| ServerError::Unspecified(e.to_string()))?,
    };
    let intent = OrderIntent {
        token,
        user_id: request.user_id,
        machine_id: request.machine_id,
        lines: request.items.into_iter().map(|i| OrderLine::new(i.product_id, i.quantity)).collect(),
        submitted_at: Utc::now(),
        declared_total: request.declared_total,
    };
    let topic = api.submit_order_intent(&intent).await.map_err(|e| {
        warn!("💻️ Could not submit intent {}. {e}", intent.token);
        ServerError::from(e)
    })?;
    info!("💻️ Intent {} submitted for user {}", intent.token, intent.user_id);
    Ok(HttpResponse::Accepted().json(IntentAccepted { token: intent.token.to_string(), topic }))
}

route!(order_intent_status => Get "/orders/intent/{token}" impl VendingBackend, MessagePublisher);
pub async fn order_intent_status<B, P>(
    path: web::Path<String>,
    api: web::Data<VendingPipeline<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: VendingBackend,
    P: MessagePublisher,
{
    let token =
        path.into_inner().parse::<CorrelationToken>().map_err(|e| ServerError::InvalidRequestPath(e.to_string()))?;
    trace!("💻️ GET status of {token}");
    let status = IntentStatusDto::from_status(token.as_str(), api.order_status(&token))
        .ok_or_else(|| ServerError::NoRecordFound(format!("No outcome is known for {token}")))?;
    Ok(HttpResponse::Ok().json(status))
}

//----------------------------------------------   Commands  ----------------------------------------------------
route!(dispatch_command => Post "/machines/{code}/command" impl VendingBackend, MessagePublisher);
/// Sends an operator command to a machine.
///
/// Supported commands are `CHANGE_TEMPERATURE` (a number within the configured safe range), `SET_STATUS`
/// (a status code or name) and `DISPENSE_PRODUCT` (`{"productId": .., "quantity": ..}`). Invalid commands are
/// rejected with `400 Bad Request` and are never published.
pub async fn dispatch_command<B, P>(
    path: web::Path<String>,
    body: web::Json<CommandRequest>,
    api: web::Data<VendingPipeline<B, P>>,
) -> Result<HttpResponse, ServerError>
where
    B: VendingBackend,
    P: MessagePublisher,
{
    let code = path.into_inner();
    let CommandRequest { command, value } = body.into_inner();
    debug!("💻️ POST {command} to {code}");
    let envelope = api.dispatch_command(&code, &command, value).await?;
    Ok(HttpResponse::Ok().json(envelope))
}

//----------------------------------------------   Stats  ----------------------------------------------------
route!(stats => Get "/stats" impl VendingBackend, MessagePublisher);
pub async fn stats<B, P>(
    api: web::Data<VendingPipeline<B, P>>,
    stats: web::Data<OutcomeStats>,
) -> Result<HttpResponse, ServerError>
where
    B: VendingBackend,
    P: MessagePublisher,
{
    trace!("💻️ GET stats");
    let snapshot = StatsSnapshot {
        orders_reconciled: stats.reconciled(),
        orders_rejected: stats.rejected(),
        tracked_tokens: api.tracked_tokens(),
        dropped_messages: api.dropped_messages(),
        devices: api.registry().len(),
    };
    Ok(HttpResponse::Ok().json(snapshot))
}
