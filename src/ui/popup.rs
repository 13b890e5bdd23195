/// Popup UI: status of the current tab plus the other marked pages of its site

use crate::bridge::{close_popup, open_list_page, ChromeHost, ChromeStorage};
use crate::coordinator::BrowserHost;
use crate::normalize::origin_of;
use crate::page_data::{PageRecord, Status, TabInfo};
use crate::settings::Settings;
use crate::surface::{PopupView, SurfaceClient};
use crate::ui::components::{status_label, PageRow, StatusButtons};
use crate::ui::surface_client;
use log::warn;
use patternfly_yew::prelude::*;
use wasm_bindgen_futures::spawn_local;
use yew::prelude::*;

#[derive(Clone, PartialEq)]
struct Loaded {
    tab: TabInfo,
    key: String,
    status: Status,
    related: Vec<PageRecord>,
    settings: Settings,
}

#[derive(Clone, PartialEq)]
enum AppState {
    Loading,
    Idle,
    Saving,
    Error(String),
}

#[function_component(App)]
pub fn app() -> Html {
    let client = use_memo((), |_| surface_client());
    let state = use_state(|| AppState::Loading);
    let loaded = use_state(|| None::<Loaded>);

    // Load current tab on mount
    {
        let client = client.clone();
        let state = state.clone();
        let loaded = loaded.clone();

        use_effect_with((), move |_| {
            spawn_local(async move {
                match load_popup(&client).await {
                    Ok(Some(data)) => {
                        loaded.set(Some(data));
                        state.set(AppState::Idle);
                    }
                    Ok(None) => close_popup(),
                    Err(e) => state.set(AppState::Error(e)),
                }
            });
            || ()
        });
    }

    let on_select = {
        let client = client.clone();
        let state = state.clone();
        let loaded = loaded.clone();

        Callback::from(move |status: Status| {
            let Some(current) = (*loaded).clone() else {
                return;
            };
            let client = client.clone();
            let state = state.clone();
            let loaded = loaded.clone();

            state.set(AppState::Saving);
            spawn_local(async move {
                match client.mark_tab(&current.tab, status).await {
                    Ok(_) => {
                        let related = related_pages(&client, &current.key).await;
                        loaded.set(Some(Loaded {
                            status: status.retire(),
                            related,
                            ..current
                        }));
                        state.set(AppState::Idle);
                    }
                    Err(e) => state.set(AppState::Error(format!("Failed to save: {}", e))),
                }
            });
        })
    };

    let on_related_status = {
        let client = client.clone();
        let loaded = loaded.clone();
        let state = state.clone();

        Callback::from(move |(url, status): (String, Status)| {
            let Some(current) = (*loaded).clone() else {
                return;
            };
            let client = client.clone();
            let loaded = loaded.clone();
            let state = state.clone();

            spawn_local(async move {
                if let Err(e) = client.change_status(&url, status, None).await {
                    state.set(AppState::Error(format!("Failed to save: {}", e)));
                    return;
                }
                let related = related_pages(&client, &current.key).await;
                loaded.set(Some(Loaded { related, ..current }));
            });
        })
    };

    let on_related_remove = {
        let client = client.clone();
        let loaded = loaded.clone();
        let state = state.clone();

        Callback::from(move |url: String| {
            let Some(current) = (*loaded).clone() else {
                return;
            };
            let client = client.clone();
            let loaded = loaded.clone();
            let state = state.clone();

            spawn_local(async move {
                if let Err(e) = client.remove(&url).await {
                    state.set(AppState::Error(format!("Failed to remove: {}", e)));
                    return;
                }
                let related = related_pages(&client, &current.key).await;
                loaded.set(Some(Loaded { related, ..current }));
            });
        })
    };

    let on_open_list = Callback::from(move |_| {
        spawn_local(async move {
            if let Err(e) = open_list_page().await {
                warn!("{}", e);
            }
        });
    });

    let is_busy = !matches!(*state, AppState::Idle);

    html! {
        <div class="padding-20">
            <h1 class="popup-title">{"Marked as done"}</h1>

            {match &*state {
                AppState::Loading => html! {
                    <div class="loading-text-center">
                        <Spinner />
                    </div>
                },
                AppState::Error(err) => html! {
                    <Alert r#type={AlertType::Danger} title={"Error"} inline={true}>
                        {err.clone()}
                    </Alert>
                },
                AppState::Idle | AppState::Saving => html! {}
            }}

            if let Some(data) = (*loaded).clone() {
                <p class="current-status">
                    {format!("This page: {}", status_label(data.status))}
                </p>
                <StatusButtons
                    current={data.status}
                    states={data.settings.enabled_states.clone()}
                    on_select={on_select}
                    disabled={is_busy}
                />

                if !data.related.is_empty() {
                    <div class="related-container">
                        <h2 class="related-title">{"On this site"}</h2>
                        {for data.related.iter().filter(|r| r.key != data.key).map(|record| html! {
                            <PageRow
                                record={record.clone()}
                                on_status={on_related_status.clone()}
                                on_remove={on_related_remove.clone()}
                            />
                        })}
                    </div>
                }
            }

            <Button onclick={on_open_list} variant={ButtonVariant::Link} block={true}>
                {"All marked pages"}
            </Button>
        </div>
    }
}

// Helper functions

async fn load_popup(client: &SurfaceClient) -> Result<Option<Loaded>, String> {
    let settings = Settings::load(&ChromeStorage)
        .await
        .map_err(|e| format!("Failed to load settings: {}", e))?;
    let Some(tab) = ChromeHost
        .active_tab()
        .await
        .map_err(|e| format!("Failed to get tab: {}", e))?
    else {
        return Ok(None);
    };

    match client
        .open_popup(&tab, &settings)
        .await
        .map_err(|e| format!("Failed to open: {}", e))?
    {
        PopupView::Close => Ok(None),
        PopupView::Show { key, status } => {
            let related = related_pages(client, &key).await;
            Ok(Some(Loaded {
                tab,
                key,
                status,
                related,
                settings,
            }))
        }
    }
}

/// Marked pages sharing the origin of `key`. Failures only cost the list.
async fn related_pages(client: &SurfaceClient, key: &str) -> Vec<PageRecord> {
    let Some(origin) = origin_of(key) else {
        return Vec::new();
    };
    client.snapshot(Some(&origin)).await.unwrap_or_else(|e| {
        warn!("could not load pages of {}: {}", origin, e);
        Vec::new()
    })
}
