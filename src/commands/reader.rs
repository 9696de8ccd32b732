use anyhow::Result;
use tauri::{AppHandle, Emitter, Manager};
use tauri_plugin_opener::OpenerExt;

use crate::reader::{DocumentExtractor, LoadedArticle, PageFetcher, Reader};
use crate::state::{AppState, AppStatus};

pub const ARTICLE_EVENT: &str = "article-status";

/// Tauri command: fetch and extract the article at `url`
#[tauri::command]
pub async fn load_article(app_handle: AppHandle, url: String) -> Result<LoadedArticle, String> {
    {
        let state = app_handle.state::<AppState>();
        let mut status = state.status.lock().map_err(|e| e.to_string())?;
        if *status == AppStatus::Loading {
            return Err("An article is already loading".to_string());
        }
        *status = AppStatus::Loading;
    }
    set_status(&app_handle, AppStatus::Loading);

    let result = do_load(&app_handle, &url).await;

    let state = app_handle.state::<AppState>();
    let next = match &result {
        Ok(loaded) => {
            if let Ok(mut article) = state.article.lock() {
                *article = Some(loaded.clone());
            }
            AppStatus::Ready
        }
        Err(e) => {
            tracing::warn!("Could not load {}: {}", url, e);
            let has_article = state.article.lock().map(|a| a.is_some()).unwrap_or(false);
            if has_article {
                AppStatus::Ready
            } else {
                AppStatus::Idle
            }
        }
    };
    if let Ok(mut status) = state.status.lock() {
        *status = next;
    }
    set_status(&app_handle, next);

    result.map_err(|e| e.to_string())
}

/// Tauri command: the article currently loaded, if any
#[tauri::command]
pub fn current_article(app_handle: AppHandle) -> Result<Option<LoadedArticle>, String> {
    let state = app_handle.state::<AppState>();
    let article = state.article.lock().map_err(|e| e.to_string())?;
    Ok(article.clone())
}

/// Tauri command: open the loaded article in the system browser
#[tauri::command]
pub fn open_article_url(app_handle: AppHandle) -> Result<(), String> {
    let url = {
        let state = app_handle.state::<AppState>();
        let article = state.article.lock().map_err(|e| e.to_string())?;
        article
            .as_ref()
            .map(|loaded| loaded.url.clone())
            .ok_or_else(|| "No article loaded".to_string())?
    };
    app_handle
        .opener()
        .open_url(url, None::<&str>)
        .map_err(|e| e.to_string())
}

async fn do_load(app_handle: &AppHandle, url: &str) -> Result<LoadedArticle> {
    let reader = {
        let state = app_handle.state::<AppState>();
        let settings = state
            .settings
            .lock()
            .map_err(|_| anyhow::anyhow!("Settings state poisoned"))?
            .reader
            .clone();
        let fetcher = PageFetcher::new(settings.proxies, settings.request_timeout())?;
        Reader::new(fetcher, Box::new(DocumentExtractor), settings.min_content_chars)
    };

    // A new page replaces whatever was being read.
    app_handle
        .state::<AppState>()
        .with_playback(|c| c.stop())?;

    Ok(reader.load(url).await?)
}

fn set_status(app_handle: &AppHandle, status: AppStatus) {
    if let Err(e) = app_handle.emit(ARTICLE_EVENT, status) {
        tracing::error!("Failed to emit {}: {}", ARTICLE_EVENT, e);
    }
}
