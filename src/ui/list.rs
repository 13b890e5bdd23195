/// Marked pages viewer: every record grouped by site, with search and data management

use crate::bridge::export_to_file;
use crate::indexer::{filter_pages, group_by_origin, origin_summaries};
use crate::page_data::{PageRecord, Status};
use crate::protocol::ImportEntry;
use crate::surface::{SurfaceClient, TwoStepConfirm};
use crate::ui::components::PageRow;
use crate::ui::surface_client;
use log::warn;
use patternfly_yew::prelude::*;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{HtmlInputElement, console};
use yew::prelude::*;

#[derive(Clone, PartialEq)]
enum ViewState {
    Loading,
    Idle,
    Message(String),
    Error(String),
}

#[function_component(ListViewer)]
pub fn list_viewer() -> Html {
    let client = use_memo((), |_| surface_client());
    let state = use_state(|| ViewState::Loading);
    let records = use_state(Vec::<PageRecord>::new);
    let search_query = use_state(String::new);
    let import_text = use_state(String::new);
    let confirm = use_mut_ref(TwoStepConfirm::default);
    let confirm_armed = use_state(|| false);

    let reload = {
        let client = client.clone();
        let state = state.clone();
        let records = records.clone();

        Callback::from(move |_: ()| {
            let client = client.clone();
            let state = state.clone();
            let records = records.clone();

            spawn_local(async move {
                match client.on_resume(None).await {
                    Ok(fresh) => {
                        records.set(fresh);
                        if *state == ViewState::Loading {
                            state.set(ViewState::Idle);
                        }
                    }
                    Err(e) => state.set(ViewState::Error(format!("Failed to load: {}", e))),
                }
            });
        })
    };

    // Load on mount, re-fetch whenever the page becomes visible again
    {
        let reload = reload.clone();
        use_effect_with((), move |_| {
            reload.emit(());

            let document = web_sys::window().and_then(|window| window.document());
            let listener = Closure::<dyn Fn()>::new({
                let document = document.clone();
                move || {
                    if document.as_ref().is_some_and(|document| !document.hidden()) {
                        reload.emit(());
                    }
                }
            });
            if let Some(document) = &document {
                let _ = document.add_event_listener_with_callback(
                    "visibilitychange",
                    listener.as_ref().unchecked_ref(),
                );
            }

            move || {
                if let Some(document) = &document {
                    let _ = document.remove_event_listener_with_callback(
                        "visibilitychange",
                        listener.as_ref().unchecked_ref(),
                    );
                }
            }
        });
    }

    let on_search_input = {
        let search_query = search_query.clone();
        Callback::from(move |e: InputEvent| {
            if let Some(input) = e.target_dyn_into::<HtmlInputElement>() {
                search_query.set(input.value());
            }
        })
    };

    let on_status = {
        let client = client.clone();
        let state = state.clone();
        let reload = reload.clone();

        Callback::from(move |(url, status): (String, Status)| {
            let client = client.clone();
            let state = state.clone();
            let reload = reload.clone();

            spawn_local(async move {
                if let Err(e) = client.change_status(&url, status, None).await {
                    state.set(ViewState::Error(format!("Failed to save: {}", e)));
                }
                reload.emit(());
            });
        })
    };

    let on_remove = {
        let client = client.clone();
        let state = state.clone();
        let reload = reload.clone();

        Callback::from(move |url: String| {
            let client = client.clone();
            let state = state.clone();
            let reload = reload.clone();

            spawn_local(async move {
                if let Err(e) = client.remove(&url).await {
                    state.set(ViewState::Error(format!("Failed to remove: {}", e)));
                }
                reload.emit(());
            });
        })
    };

    let on_export = {
        let client = client.clone();
        Callback::from(move |_| {
            let client = client.clone();
            spawn_local(async move {
                match export_json(&client).await {
                    Ok(json) => {
                        let filename = format!("marked-as-done-{}.json", js_sys::Date::now() as i64);
                        export_to_file(&json, &filename);
                    }
                    Err(e) => {
                        console::log_1(&format!("Export failed: {}", e).into());
                    }
                }
            });
        })
    };

    let on_import_input = {
        let import_text = import_text.clone();
        Callback::from(move |e: InputEvent| {
            if let Some(input) = e.target_dyn_into::<web_sys::HtmlTextAreaElement>() {
                import_text.set(input.value());
            }
        })
    };

    let on_import = {
        let client = client.clone();
        let state = state.clone();
        let import_text = import_text.clone();
        let reload = reload.clone();

        Callback::from(move |_| {
            let data: Vec<ImportEntry> = match serde_json::from_str(&import_text) {
                Ok(data) => data,
                Err(e) => {
                    state.set(ViewState::Error(format!("Not an export file: {}", e)));
                    return;
                }
            };
            let client = client.clone();
            let state = state.clone();
            let import_text = import_text.clone();
            let reload = reload.clone();

            spawn_local(async move {
                match client.import(data).await {
                    Ok(ack) => {
                        import_text.set(String::new());
                        state.set(ViewState::Message(format!("Import: {}", ack)));
                    }
                    Err(e) => state.set(ViewState::Error(format!("Import failed: {}", e))),
                }
                reload.emit(());
            });
        })
    };

    let on_clear = {
        let client = client.clone();
        let state = state.clone();
        let confirm = confirm.clone();
        let confirm_armed = confirm_armed.clone();
        let reload = reload.clone();

        Callback::from(move |_| {
            let client = client.clone();
            let state = state.clone();
            let confirm = confirm.clone();
            let confirm_armed = confirm_armed.clone();
            let reload = reload.clone();

            spawn_local(async move {
                let mut current = std::mem::take(&mut *confirm.borrow_mut());
                let result = client.clear_all(&mut current).await;
                confirm_armed.set(current.is_armed());
                *confirm.borrow_mut() = current;
                match result {
                    Ok(true) => {
                        state.set(ViewState::Message("All data deleted".to_string()));
                        reload.emit(());
                    }
                    Ok(false) => {}
                    Err(e) => state.set(ViewState::Error(format!("Failed to clear: {}", e))),
                }
            });
        })
    };

    let on_cancel_clear = {
        let confirm = confirm.clone();
        let confirm_armed = confirm_armed.clone();
        Callback::from(move |_| {
            confirm.borrow_mut().cancel();
            confirm_armed.set(false);
        })
    };

    let visible = filter_pages(&records, &search_query);
    let groups = group_by_origin(visible);
    let summaries = origin_summaries(&groups);

    html! {
        <div class="container">
            <div class="header">
                <h1 class="main-title">{"Marked pages"}</h1>
                <Button onclick={on_export} variant={ButtonVariant::Secondary}>
                    {"📥 Export"}
                </Button>
            </div>

            {match &*state {
                ViewState::Loading => html! {
                    <div class="loading-text-center">
                        <Spinner />
                        <p class="loading-text">{"Loading pages..."}</p>
                    </div>
                },
                ViewState::Message(msg) => html! {
                    <Alert r#type={AlertType::Success} title={msg.clone()} inline={true}>
                    </Alert>
                },
                ViewState::Error(err) => html! {
                    <Alert r#type={AlertType::Danger} title={"Error"} inline={true}>
                        {err.clone()}
                    </Alert>
                },
                ViewState::Idle => html! {}
            }}

            <div class="search-container">
                <input
                    type="text"
                    placeholder="Search titles or URLs..."
                    value={(*search_query).clone()}
                    oninput={on_search_input}
                    class="search-input"
                />
            </div>

            if summaries.is_empty() {
                <div class="empty-state">
                    if search_query.is_empty() {
                        <p>{"No marked pages yet."}</p>
                        <p class="empty-state-hint">{"Use the toolbar popup to mark a page."}</p>
                    } else {
                        <p>{"No pages match your search."}</p>
                    }
                </div>
            } else {
                <div class="origins-list">
                    {for summaries.iter().map(|summary| {
                        let pages = groups.get(&summary.origin).cloned().unwrap_or_default();
                        html! {
                            <div key={summary.origin.clone()} class="origin-group">
                                <h4 class="origin-title">
                                    {format!("{} ({}/{})", summary.origin, summary.done, summary.total)}
                                </h4>
                                <div class="pages-list">
                                    {for pages.into_iter().map(|record| html! {
                                        <PageRow
                                            record={record}
                                            on_status={on_status.clone()}
                                            on_remove={on_remove.clone()}
                                        />
                                    })}
                                </div>
                            </div>
                        }
                    })}
                </div>
            }

            <div class="data-management">
                <h2 class="section-title">{"Import"}</h2>
                <textarea
                    class="import-input"
                    placeholder="Paste an exported JSON file..."
                    value={(*import_text).clone()}
                    oninput={on_import_input}
                />
                <Button onclick={on_import} variant={ButtonVariant::Secondary} disabled={import_text.is_empty()}>
                    {"Import"}
                </Button>

                <h2 class="section-title">{"Delete everything"}</h2>
                <Button onclick={on_clear} variant={ButtonVariant::Danger}>
                    {if *confirm_armed { "Really delete all pages?" } else { "Delete all data" }}
                </Button>
                if *confirm_armed {
                    <Button onclick={on_cancel_clear} variant={ButtonVariant::Link}>
                        {"Cancel"}
                    </Button>
                }
            </div>

            <div class="footer">
                {format!("{} pages on {} sites", records.len(), summaries.len())}
            </div>
        </div>
    }
}

// Helper functions

async fn export_json(client: &SurfaceClient) -> Result<String, String> {
    let entries = client
        .export()
        .await
        .map_err(|e| format!("Failed to read pages: {}", e))?;
    serde_json::to_string_pretty(&entries).map_err(|e| {
        warn!("export serialization failed: {}", e);
        format!("Failed to serialize: {:?}", e)
    })
}
