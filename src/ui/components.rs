/// Reusable UI components

use crate::page_data::{PageRecord, Status};
use patternfly_yew::prelude::*;
use yew::prelude::*;

pub fn status_label(status: Status) -> &'static str {
    match status {
        Status::Todo | Status::Started => "To do",
        Status::Done => "Done",
        Status::None => "Not marked",
        Status::Disabled => "Not available",
    }
}

#[derive(Properties, PartialEq)]
pub struct StatusButtonsProps {
    pub current: Status,
    /// Statuses offered, in order
    pub states: Vec<Status>,
    pub on_select: Callback<Status>,
    #[prop_or(false)]
    pub disabled: bool,
}

/// One button per offered status, plus "unmark" for marked pages.
#[function_component(StatusButtons)]
pub fn status_buttons(props: &StatusButtonsProps) -> Html {
    let button = |status: Status, text: &'static str| {
        let variant = if props.current == status {
            ButtonVariant::Primary
        } else {
            ButtonVariant::Secondary
        };
        let onclick = props.on_select.reform(move |_| status);
        html! {
            <Button {onclick} {variant} disabled={props.disabled} block={true}>
                {text}
            </Button>
        }
    };

    html! {
        <div class="flex-column-gap">
            {for props.states.iter().map(|status| button(*status, status_label(*status)))}
            if props.current != Status::None {
                {button(Status::None, "Unmark")}
            }
        </div>
    }
}

#[derive(Properties, PartialEq)]
pub struct PageRowProps {
    pub record: PageRecord,
    pub on_status: Callback<(String, Status)>,
    pub on_remove: Callback<String>,
}

#[function_component(PageRow)]
pub fn page_row(props: &PageRowProps) -> Html {
    let record = &props.record;
    let status = record.status();
    let title = record.properties.title.clone().unwrap_or_else(|| record.key.clone());
    let toggled = if status == Status::Done { Status::Todo } else { Status::Done };
    let class = status.link_class().unwrap_or_default();

    let on_toggle = {
        let key = record.key.clone();
        props.on_status.reform(move |_| (key.clone(), toggled))
    };
    let on_remove = {
        let key = record.key.clone();
        props.on_remove.reform(move |_| key.clone())
    };

    html! {
        <div key={record.key.clone()} class="page-item">
            <div class="page-content">
                <a class={classes!("page-title", class)} href={record.key.clone()} target="_blank">
                    {title}
                </a>
                <div class="page-url">{&record.key}</div>
            </div>
            <div class="page-actions">
                <Button onclick={on_toggle} variant={ButtonVariant::Secondary} size={ButtonSize::Small}>
                    {if toggled == Status::Done { "✓" } else { "↺" }}
                </Button>
                <Button onclick={on_remove} variant={ButtonVariant::Danger} size={ButtonSize::Small}>
                    {"✗"}
                </Button>
            </div>
        </div>
    }
}
