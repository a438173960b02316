use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::Method;
use actix_web::middleware::Next;
use actix_web::Error;

use crate::core::query_params::{get_string, parse_query_params};

/// Lets HTML forms reach PUT and DELETE routes: a POST whose query string
/// carries `_method=PUT` or `_method=DELETE` is re-dispatched with that
/// method. Must wrap the whole app so it runs before routing.
pub async fn method_override(
    mut req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    if req.method() == Method::POST {
        let params = parse_query_params(req.query_string());
        let target = get_string(&params, "_method", None).and_then(|m| overridden_method(&m));
        if let Some(method) = target {
            tracing::debug!(path = %req.path(), %method, "method override");
            req.head_mut().method = method;
        }
    }

    next.call(req).await
}

fn overridden_method(raw: &str) -> Option<Method> {
    match raw.to_ascii_uppercase().as_str() {
        "PUT" => Some(Method::PUT),
        "DELETE" => Some(Method::DELETE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_write_methods_can_be_requested() {
        assert_eq!(overridden_method("put"), Some(Method::PUT));
        assert_eq!(overridden_method("DELETE"), Some(Method::DELETE));
        assert_eq!(overridden_method("GET"), None);
        assert_eq!(overridden_method("PATCH"), None);
        assert_eq!(overridden_method("CONNECT"), None);
    }
}
