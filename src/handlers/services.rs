//! Public service catalog

use crate::catalog::{self, Country, ServiceDefinition};
use crate::error::ApiError;
use crate::routing_token;
use axum::{
    extract::{Path, Query},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    pub country: Option<String>,
}

/// A catalog entry plus the opaque token used in service URLs
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceView {
    #[serde(flatten)]
    pub definition: &'static ServiceDefinition,
    pub route_token: String,
}

impl From<&'static ServiceDefinition> for ServiceView {
    fn from(definition: &'static ServiceDefinition) -> Self {
        Self {
            definition,
            route_token: routing_token::encode(definition.value),
        }
    }
}

/// `GET /api/services?country=...`. Without a country every definition is
/// listed, grouped by country.
pub async fn list_services(
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Vec<ServiceView>>, ApiError> {
    let countries = match query.country.as_deref() {
        Some(raw) => vec![Country::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown country '{}'", raw)))?],
        None => Country::ALL.to_vec(),
    };

    Ok(Json(
        countries
            .into_iter()
            .flat_map(catalog::list_by_country)
            .map(ServiceView::from)
            .collect(),
    ))
}

/// `GET /api/services/{idOrToken}`
pub async fn get_service(Path(raw): Path<String>) -> Result<Json<ServiceView>, ApiError> {
    routing_token::resolve(&raw)
        .as_deref()
        .and_then(catalog::find_by_value)
        .map(|definition| Json(ServiceView::from(definition)))
        .ok_or(ApiError::NotFound("Service"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_by_country_carries_route_tokens() {
        let Json(views) = list_services(Query(CatalogQuery {
            country: Some("Tunisie".to_string()),
        }))
        .await
        .unwrap();

        assert!(!views.is_empty());
        for view in &views {
            assert_eq!(view.definition.country, Country::Tunisia);
            assert_eq!(
                routing_token::decode(&view.route_token).as_deref(),
                Some(view.definition.value)
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_country_is_rejected() {
        let result = list_services(Query(CatalogQuery {
            country: Some("Atlantis".to_string()),
        }))
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_get_by_value_or_token() {
        let value = catalog::SERVICES[0].value;

        let Json(by_value) = get_service(Path(value.to_string())).await.unwrap();
        assert_eq!(by_value.definition.value, value);

        let token = routing_token::encode(value);
        let Json(by_token) = get_service(Path(token)).await.unwrap();
        assert_eq!(by_token.definition.value, value);

        assert!(matches!(
            get_service(Path("NO_SUCH_SERVICE".to_string())).await,
            Err(ApiError::NotFound("Service"))
        ));
    }

    #[test]
    fn test_view_serializes_flat() {
        let view = ServiceView::from(&catalog::SERVICES[0]);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["value"], catalog::SERVICES[0].value);
        assert!(json["routeToken"].is_string());
        assert!(json["fields"].is_array());
    }
}
