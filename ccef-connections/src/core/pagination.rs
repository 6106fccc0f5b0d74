//! Pagination driver for list endpoints.
//!
//! Upstream APIs paginate in four shapes, modeled as a closed set of
//! tagged styles selected per connector. Across all styles an
//! absent/empty/null continuation signal is the unique termination
//! condition; a present signal is always followed, so the driver enforces
//! [`MAX_PAGES`] as a safety bound against upstreams that return a
//! repeating or non-terminating cursor.

use reqwest::Method;
use serde_json::Value;

use crate::core::http::RestClient;
use crate::error::Error;

/// Hard ceiling on pages followed in a single pagination pass.
pub(crate) const MAX_PAGES: u32 = 10_000;

/// How a service's list endpoints paginate.
pub(crate) enum PageStyle {
    /// HAL style: items under `_embedded[resource_key]`, follow
    /// `_links.next.href` until absent. (HelpScout, Action Network.)
    NextLink,
    /// `page`/`per_page` params with `total_pages` in the body; items under
    /// `_embedded[resource_key]`. (Action Builder.)
    PageNumber { per_page: u32 },
    /// Opaque continuation token echoed back as a query parameter; items
    /// under `resource_key` at the top level. (Zoom, Airtable.)
    PageToken {
        param: &'static str,
        field: &'static str,
        size: (&'static str, u32),
    },
    /// Item pages with an explicit `next` URL-or-null field; `page` is
    /// incremented until `next` is null. (ROI CRM.)
    ItemsNext { per_page: u32 },
}

/// One pagination pass: issue requests until the style's termination
/// condition, concatenating items in page order.
pub(crate) async fn paginate(
    client: &mut RestClient,
    path: &str,
    resource_key: &str,
    params: &[(String, String)],
    style: &PageStyle,
) -> Result<Vec<Value>, Error> {
    match style {
        PageStyle::NextLink => next_link(client, path, resource_key, params).await,
        PageStyle::PageNumber { per_page } => {
            page_number(client, path, resource_key, params, *per_page).await
        }
        PageStyle::PageToken { param, field, size } => {
            page_token(client, path, resource_key, params, param, field, *size).await
        }
        PageStyle::ItemsNext { per_page } => {
            items_next(client, path, resource_key, params, *per_page).await
        }
    }
}

async fn next_link(
    client: &mut RestClient,
    path: &str,
    resource_key: &str,
    params: &[(String, String)],
) -> Result<Vec<Value>, Error> {
    let mut results = Vec::new();
    let mut current_path = path.to_string();
    let mut current_params = params.to_vec();

    for _ in 0..MAX_PAGES {
        let data = match client
            .request(Method::GET, &current_path, &current_params, None)
            .await?
        {
            Some(data) => data,
            None => return Ok(results),
        };

        extend_embedded(&mut results, &data, resource_key);

        let next = data
            .get("_links")
            .and_then(|links| links.get("next"))
            .and_then(|next| next.get("href"))
            .and_then(Value::as_str);
        match next {
            Some(link) if !link.is_empty() => {
                current_path = relativize(client.base_url(), link);
                // Params are encoded in the next URL.
                current_params.clear();
            }
            _ => return Ok(results),
        }
    }

    Err(pagination_limit(client))
}

async fn page_number(
    client: &mut RestClient,
    path: &str,
    resource_key: &str,
    params: &[(String, String)],
    per_page: u32,
) -> Result<Vec<Value>, Error> {
    let mut results = Vec::new();
    let mut page: u64 = 1;

    for _ in 0..MAX_PAGES {
        let mut page_params = vec![
            ("page".to_string(), page.to_string()),
            ("per_page".to_string(), per_page.to_string()),
        ];
        page_params.extend(params.iter().cloned());

        let data = match client.request(Method::GET, path, &page_params, None).await? {
            Some(data) => data,
            None => return Ok(results),
        };

        extend_embedded(&mut results, &data, resource_key);

        let total_pages = data.get("total_pages").and_then(Value::as_u64).unwrap_or(1);
        if page >= total_pages {
            return Ok(results);
        }
        page += 1;
    }

    Err(pagination_limit(client))
}

async fn page_token(
    client: &mut RestClient,
    path: &str,
    resource_key: &str,
    params: &[(String, String)],
    param: &str,
    field: &str,
    size: (&str, u32),
) -> Result<Vec<Value>, Error> {
    let mut results = Vec::new();
    let (size_param, page_size) = size;
    let mut base_params = vec![(size_param.to_string(), page_size.to_string())];
    base_params.extend(params.iter().cloned());
    let mut token: Option<String> = None;

    for _ in 0..MAX_PAGES {
        let mut page_params = base_params.clone();
        if let Some(token) = &token {
            page_params.push((param.to_string(), token.clone()));
        }

        let data = match client.request(Method::GET, path, &page_params, None).await? {
            Some(data) => data,
            None => return Ok(results),
        };

        match data.get(resource_key).and_then(Value::as_array) {
            Some(items) => results.extend(items.iter().cloned()),
            None => return Ok(results),
        }

        match data.get(field).and_then(Value::as_str) {
            Some(next) if !next.is_empty() => token = Some(next.to_string()),
            _ => return Ok(results),
        }
    }

    Err(pagination_limit(client))
}

async fn items_next(
    client: &mut RestClient,
    path: &str,
    resource_key: &str,
    params: &[(String, String)],
    per_page: u32,
) -> Result<Vec<Value>, Error> {
    let mut results = Vec::new();
    let mut page: u64 = params
        .iter()
        .find(|(key, _)| key.as_str() == "page")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(1);
    let base_params: Vec<(String, String)> = params
        .iter()
        .filter(|(key, _)| key.as_str() != "page")
        .cloned()
        .collect();

    for _ in 0..MAX_PAGES {
        let mut page_params = vec![
            ("per_page".to_string(), per_page.to_string()),
            ("page".to_string(), page.to_string()),
        ];
        page_params.extend(base_params.iter().cloned());

        let data = match client.request(Method::GET, path, &page_params, None).await? {
            Some(data) => data,
            None => return Ok(results),
        };

        if let Some(items) = data.get(resource_key).and_then(Value::as_array) {
            results.extend(items.iter().cloned());
        }

        match data.get("next") {
            Some(next) if continuation_present(next) => page += 1,
            _ => return Ok(results),
        }
    }

    Err(pagination_limit(client))
}

fn extend_embedded(results: &mut Vec<Value>, data: &Value, resource_key: &str) {
    if let Some(items) = data
        .get("_embedded")
        .and_then(|embedded| embedded.get(resource_key))
        .and_then(Value::as_array)
    {
        results.extend(items.iter().cloned());
    }
}

/// Reduce an absolute next link to a relative path when it shares the
/// API's base; foreign links are followed verbatim.
fn relativize(base: &str, link: &str) -> String {
    match link.strip_prefix(base) {
        Some(relative) => relative.to_string(),
        None => link.to_string(),
    }
}

fn continuation_present(next: &Value) -> bool {
    match next {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn pagination_limit(client: &RestClient) -> Error {
    Error::PaginationLimit {
        service: client.service().to_string(),
        pages: MAX_PAGES,
    }
}
