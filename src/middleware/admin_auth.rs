use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::ErrorUnauthorized,
    web, Error, FromRequest, HttpMessage, HttpRequest,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use subtle::ConstantTimeEq;

use crate::config::AppConfig;

/// Proof that the admin guard ran. Handlers take this as an extractor, so an
/// offline-booking call can never reach the service layer without it.
#[derive(Clone)]
pub struct AdminPrincipal {
    pub label: String,
}

impl FromRequest for AdminPrincipal {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        if let Some(principal) = req.extensions().get::<AdminPrincipal>() {
            ready(Ok(principal.clone()))
        } else {
            ready(Err(ErrorUnauthorized("Admin access required")))
        }
    }
}

pub struct AdminAuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AdminAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AdminAuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdminAuthMiddlewareService { service }))
    }
}

pub struct AdminAuthMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AdminAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let config = match req.app_data::<web::Data<AppConfig>>() {
            Some(config) => config.clone(),
            None => {
                return Box::pin(ready(Ok(req
                    .error_response(ErrorUnauthorized("Admin access required"))
                    .map_into_right_body())));
            }
        };

        let presented = req
            .headers()
            .get("x-admin-key")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        let matches: bool = presented
            .as_bytes()
            .ct_eq(config.admin_api_key.as_bytes())
            .into();

        if matches && !config.admin_api_key.is_empty() {
            req.extensions_mut().insert(AdminPrincipal {
                label: "x-admin-key".to_string(),
            });
            let fut = self.service.call(req);
            Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
        } else {
            Box::pin(ready(Ok(req
                .error_response(ErrorUnauthorized("Admin access required"))
                .map_into_right_body())))
        }
    }
}
