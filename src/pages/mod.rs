use crate::actions::EntityActions;
use crate::components::ui::{
    Alert, AlertDescription, AlertTone, Button, ButtonSize, ButtonVariant, Card, CardContent,
    CardDescription, CardHeader, CardTitle, Checkbox, ContextMenu, Input, Label, Modal, ModalBody,
    ModalFooter, ModalHeader, ModalTitle, NativeSelect, Spinner,
};
use crate::form::{FieldDescriptor, FieldKind, FormSchema, ModalForm, ModalPhase, ModalSession};
use crate::menu::{AnchorRect, MenuAction, MenuPlacement, MenuState};
use crate::models::RecordRef;
use crate::state::{AppContext, NoticeKind};
use crate::sync::{BodyRow, Column, RecordRow, ShoppingItem, ShoppingList, EMPTY_MESSAGE};
use leptos::html;
use leptos::prelude::*;
use leptos_router::hooks::use_params;
use leptos_router::params::Params;
use wasm_bindgen::JsCast;

#[derive(Params, PartialEq, Clone, Debug)]
pub struct EntityRouteParams {
    pub module: Option<String>,
    pub subtype: Option<String>,
}

type ModalSignal = RwSignal<Option<ModalForm>>;

/// Which cell is being edited in place, if any.
type EditingCell = RwSignal<Option<(RecordRef, String)>>;

/// `time_entries` -> `Time entries`.
pub(crate) fn heading(slug: &str) -> String {
    let words = slug.replace('_', " ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Navigation links grouped by module, in registration order.
pub(crate) fn module_groups(schemas: &[FormSchema]) -> Vec<(String, Vec<(String, String)>)> {
    let mut groups: Vec<(String, Vec<(String, String)>)> = Vec::new();
    for schema in schemas {
        let link = (
            format!("/{}/{}", schema.module, schema.subtype),
            heading(&schema.subtype),
        );
        match groups.iter_mut().find(|(module, _)| *module == schema.module) {
            Some((_, links)) => links.push(link),
            None => groups.push((schema.module.clone(), vec![link])),
        }
    }
    groups
}

/// `step` for number inputs; other kinds render without the attribute.
pub(crate) fn step_attr(kind: &FieldKind) -> Option<String> {
    match kind {
        FieldKind::Decimal { step } => Some(step.to_string()),
        _ => None,
    }
}

fn from_modal<T>(modal: ModalSignal, control: String, read: fn(&ModalForm, &str) -> T) -> Signal<T>
where
    T: Default + Send + Sync + 'static,
{
    Signal::derive(move || {
        modal.with(|m| m.as_ref().map(|m| read(m, &control)).unwrap_or_default())
    })
}

fn anchor_of(ev: &web_sys::MouseEvent) -> Option<AnchorRect> {
    let el = ev.current_target()?.dyn_into::<web_sys::Element>().ok()?;
    let r = el.get_bounding_client_rect();
    Some(AnchorRect {
        left: r.left(),
        top: r.top(),
        right: r.right(),
        bottom: r.bottom(),
    })
}

/// Page chrome shared by every route: navigation, the notice slot, and the
/// single context menu and modal.
#[component]
pub fn AppLayout(children: Children) -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let actions = StoredValue::new(expect_context::<EntityActions>());

    let links = app_state
        .0
        .config
        .with_value(|c| module_groups(&c.schemas))
        .into_iter()
        .flat_map(|(_, links)| links)
        .map(|(href, label)| {
            view! {
                <a href=href class="text-muted-foreground hover:text-foreground">{label}</a>
            }
        })
        .collect_view();

    let on_choose = Callback::new(move |action: MenuAction| {
        actions.with_value(|a| a.choose(action));
    });

    view! {
        <div class="min-h-screen bg-background text-foreground">
            <header class="border-b">
                <nav class="mx-auto flex max-w-5xl flex-wrap items-center gap-3 px-4 py-3 text-sm">
                    <a href="/" class="font-semibold">"Dashboard"</a>
                    {links}
                </nav>
            </header>
            <main class="mx-auto flex max-w-5xl flex-col gap-4 px-4 py-6">
                <NoticeBanner />
                {children()}
            </main>
            <ContextMenu menu=app_state.0.menu on_choose=on_choose />
            <EntityModal />
        </div>
    }
}

#[component]
fn NoticeBanner() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let notice = app_state.0.notice;

    move || {
        notice.get().map(|n| {
            let tone = match n.kind {
                NoticeKind::Success => AlertTone::Success,
                NoticeKind::Error => AlertTone::Destructive,
            };
            view! {
                <Alert tone=tone class="flex items-start justify-between gap-3">
                    <AlertDescription>{n.message}</AlertDescription>
                    <button
                        type="button"
                        class="text-xs text-muted-foreground hover:text-foreground"
                        on:click=move |_| notice.set(None)
                    >
                        "Dismiss"
                    </button>
                </Alert>
            }
        })
    }
}

#[component]
pub fn HomePage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let actions = StoredValue::new(expect_context::<EntityActions>());

    let groups = app_state.0.config.with_value(|c| module_groups(&c.schemas));
    actions.with_value(|a| a.load_shopping_list());

    let cards = groups
        .into_iter()
        .map(|(module, links)| {
            let links = links
                .into_iter()
                .map(|(href, label)| {
                    view! {
                        <li>
                            <a class="text-primary underline-offset-4 hover:underline" href=href>
                                {label}
                            </a>
                        </li>
                    }
                })
                .collect_view();
            view! {
                <Card>
                    <CardHeader>
                        <CardTitle class="text-base">{heading(&module)}</CardTitle>
                    </CardHeader>
                    <CardContent>
                        <ul class="space-y-1 text-sm">{links}</ul>
                    </CardContent>
                </Card>
            }
        })
        .collect_view();

    view! {
        <div class="grid gap-4 md:grid-cols-3">{cards}</div>
        <ShoppingListPanel />
    }
}

/// Listing page for one `module/subtype`.
#[component]
pub fn EntityPage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let actions = StoredValue::new(expect_context::<EntityActions>());
    let config = app_state.0.config;
    let loading = app_state.0.table_loading;
    let params = use_params::<EntityRouteParams>();
    let editing: EditingCell = RwSignal::new(None);

    let route = move || {
        params
            .get()
            .ok()
            .map(|p| (p.module.unwrap_or_default(), p.subtype.unwrap_or_default()))
            .unwrap_or_default()
    };
    let known = move || {
        let (module, subtype) = route();
        config.with_value(|c| c.schema(&module, &subtype).is_some())
    };

    Effect::new(move |_| {
        let (module, subtype) = route();
        editing.set(None);
        actions.with_value(|a| {
            a.load_table(&module, &subtype);
            if module == ShoppingList::MODULE {
                a.load_shopping_list();
            }
        });
    });

    let on_new = move |_| {
        let (module, subtype) = route();
        actions.with_value(|a| a.open_create(&module, &subtype));
    };

    view! {
        <Show
            when=known
            fallback=|| {
                view! {
                    <Alert tone=AlertTone::Destructive>
                        <AlertDescription>"Unknown record type."</AlertDescription>
                    </Alert>
                }
            }
        >
            <Card>
                <CardHeader>
                    <div class="flex flex-col gap-1">
                        <CardTitle class="text-base">{move || heading(&route().1)}</CardTitle>
                        <CardDescription>"Right-click a row for actions. Hold Shift for the browser menu."</CardDescription>
                    </div>
                    <div class="flex items-center gap-2">
                        <Show when=move || loading.get() fallback=|| ().into_view()>
                            <Spinner />
                        </Show>
                        <Button size=ButtonSize::Sm on:click=on_new>"New"</Button>
                    </div>
                </CardHeader>
                <CardContent>
                    <RecordTableView editing=editing />
                </CardContent>
            </Card>
            <Show when=move || route().0 == ShoppingList::MODULE fallback=|| ().into_view()>
                <ShoppingListPanel />
            </Show>
        </Show>
    }
}

#[component]
fn RecordTableView(editing: EditingCell) -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let actions = StoredValue::new(expect_context::<EntityActions>());
    let table = app_state.0.table;
    let menu = app_state.0.menu;

    let head = move || {
        table
            .with(|t| t.as_ref().map(|t| t.columns.clone()).unwrap_or_default())
            .into_iter()
            .map(|c| view! { <th class="px-2 py-2 text-left font-medium">{c.label}</th> })
            .collect_view()
    };

    let body = move || {
        let Some((columns, rows)) =
            table.with(|t| t.as_ref().map(|t| (t.columns.clone(), t.body().to_vec())))
        else {
            return ().into_any();
        };
        rows.into_iter()
            .map(|row| match row {
                BodyRow::Placeholder { colspan } => view! {
                    <tr data-placeholder="true">
                        <td colspan=colspan.to_string() class="px-2 py-6 text-center text-muted-foreground">
                            {EMPTY_MESSAGE}
                        </td>
                    </tr>
                }
                .into_any(),
                BodyRow::Record(row) => {
                    record_row(row, columns.clone(), actions, menu, editing).into_any()
                }
            })
            .collect_view()
            .into_any()
    };

    view! {
        <table
            class="w-full text-sm"
            data-module=move || table.with(|t| t.as_ref().map(|t| t.module.clone()))
            data-subtype=move || table.with(|t| t.as_ref().map(|t| t.subtype.clone()))
        >
            <thead class="text-muted-foreground">
                <tr>
                    {head}
                    <th class="w-10">
                        <span class="sr-only">"Actions"</span>
                    </th>
                </tr>
            </thead>
            <tbody>{body}</tbody>
        </table>
    }
}

fn record_row(
    row: RecordRow,
    columns: Vec<Column>,
    actions: StoredValue<EntityActions>,
    menu: RwSignal<MenuState>,
    editing: EditingCell,
) -> impl IntoView {
    let record = row.record.clone();
    let for_menu = record.clone();
    let for_button = record.clone();
    let for_busy = record.clone();
    let for_expanded = record.clone();

    let on_contextmenu = move |ev: web_sys::MouseEvent| {
        // Shift keeps the browser's own menu.
        if ev.shift_key() {
            return;
        }
        ev.prevent_default();
        let placement = MenuPlacement::AtPointer {
            x: f64::from(ev.client_x()),
            y: f64::from(ev.client_y()),
        };
        actions.with_value(|a| a.open_menu(for_menu.clone(), placement));
    };

    let on_options = move |ev: web_sys::MouseEvent| {
        ev.stop_propagation();
        if let Some(anchor) = anchor_of(&ev) {
            actions.with_value(|a| a.open_menu(for_button.clone(), MenuPlacement::Anchored(anchor)));
        }
    };

    let cells = columns
        .into_iter()
        .map(|column| {
            let text = row.cell(&column.key).to_string();
            if column.inline_edit {
                inline_cell(record.clone(), column.key, text, actions, editing).into_any()
            } else {
                view! { <td class="px-2 py-2" data-key=column.key>{text}</td> }.into_any()
            }
        })
        .collect_view();

    let row_class = if row.completed {
        "border-t completed line-through text-muted-foreground"
    } else {
        "border-t"
    };

    view! {
        <tr
            class=row_class
            data-module=record.module.clone()
            data-subtype=record.subtype.clone()
            data-item-id=record.item_id.clone()
            data-is-done=row.completed.to_string()
            aria-busy=move || actions.with_value(|a| a.is_busy(&for_busy)).to_string()
            on:contextmenu=on_contextmenu
        >
            {cells}
            <td class="px-2 py-1 text-right">
                <Button
                    variant=ButtonVariant::Ghost
                    size=ButtonSize::Icon
                    attr:aria-label="Options"
                    attr:aria-haspopup="menu"
                    attr:aria-expanded=move || {
                        menu.with(|m| m.current().is_some_and(|o| o.record == for_expanded))
                            .to_string()
                    }
                    on:click=on_options
                >
                    "..."
                </Button>
            </td>
        </tr>
    }
}

/// Double-click to edit. Enter sends the value, Escape or leaving the field drops it.
fn inline_cell(
    record: RecordRef,
    key: String,
    text: String,
    actions: StoredValue<EntityActions>,
    editing: EditingCell,
) -> impl IntoView {
    let target = (record, key.clone());
    let for_check = target.clone();
    let is_editing = move || editing.with(|e| e.as_ref() == Some(&for_check));
    let start = target.clone();
    let shown = text.clone();

    view! {
        <td
            class="px-2 py-2 cursor-text"
            data-key=key
            data-inline-edit="true"
            on:dblclick=move |_| editing.set(Some(start.clone()))
        >
            <Show when=is_editing fallback=move || shown.clone()>
                <InlineEditor target=target.clone() initial=text.clone() actions=actions editing=editing />
            </Show>
        </td>
    }
}

#[component]
fn InlineEditor(
    target: (RecordRef, String),
    initial: String,
    actions: StoredValue<EntityActions>,
    editing: EditingCell,
) -> impl IntoView {
    let draft = RwSignal::new(initial);
    let input_ref: NodeRef<html::Input> = NodeRef::new();

    Effect::new(move |_| {
        if let Some(el) = input_ref.get() {
            let _ = el.focus();
            el.select();
        }
    });

    let target = StoredValue::new(target);
    let on_keydown = move |ev: web_sys::KeyboardEvent| match ev.key().as_str() {
        "Enter" => {
            ev.prevent_default();
            let (record, key) = target.get_value();
            editing.set(None);
            actions.with_value(|a| a.commit_cell(record, key, draft.get_untracked()));
        }
        "Escape" => {
            ev.prevent_default();
            editing.set(None);
        }
        _ => {}
    };

    view! {
        <Input
            class="h-7"
            value=draft
            on_value=Callback::new(move |v: String| draft.set(v))
            node_ref=input_ref
            on:keydown=on_keydown
            on:blur=move |_| editing.set(None)
        />
    }
}

#[component]
fn ShoppingListPanel() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let actions = StoredValue::new(expect_context::<EntityActions>());
    let list = app_state.0.shopping_list;

    let content = move || {
        let items = list.with(|l| l.items().to_vec());
        if items.is_empty() {
            return view! { <p class="text-sm text-muted-foreground">{EMPTY_MESSAGE}</p> }.into_any();
        }
        let rows = items
            .into_iter()
            .map(|item| shopping_row(item, actions))
            .collect_view();
        view! { <ul class="divide-y">{rows}</ul> }.into_any()
    };

    view! {
        <Card attr:data-module=ShoppingList::MODULE attr:data-subtype=ShoppingList::SUBTYPE>
            <CardHeader>
                <CardTitle class="text-base">"Shopping list"</CardTitle>
            </CardHeader>
            <CardContent>{content}</CardContent>
        </Card>
    }
}

fn shopping_row(item: ShoppingItem, actions: StoredValue<EntityActions>) -> impl IntoView {
    let minus = item.record.clone();
    let plus = item.record.clone();
    let busy_record = item.record.clone();
    let busy = Signal::derive(move || actions.with_value(|a| a.is_busy(&busy_record)));

    view! {
        <li
            class="flex items-center justify-between gap-3 py-2 text-sm"
            data-item-id=item.record.item_id.clone()
            data-product-id=item.product_id.clone()
            data-quantity-wanted=item.quantity_wanted.to_string()
            aria-busy=move || busy.get().to_string()
        >
            <span>{item.name}</span>
            <div class="flex items-center gap-2">
                <Button
                    variant=ButtonVariant::Outline
                    size=ButtonSize::Xs
                    attr:aria-label="Decrease quantity"
                    attr:disabled=move || busy.get()
                    on:click=move |_| actions.with_value(|a| a.change_quantity(minus.clone(), -1))
                >
                    "-"
                </Button>
                <span class="min-w-6 text-center tabular-nums">{item.quantity_wanted}</span>
                <Button
                    variant=ButtonVariant::Outline
                    size=ButtonSize::Xs
                    attr:aria-label="Increase quantity"
                    attr:disabled=move || busy.get()
                    on:click=move |_| actions.with_value(|a| a.change_quantity(plus.clone(), 1))
                >
                    "+"
                </Button>
            </div>
        </li>
    }
}

/// The one create/edit modal. Its fields come from whichever schema opened it.
#[component]
fn EntityModal() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let actions = StoredValue::new(expect_context::<EntityActions>());
    let modal = app_state.0.modal;

    let open = Signal::derive(move || {
        modal.with(|m| m.as_ref().is_some_and(|f| f.phase().is_open()))
    });
    let on_close = Callback::new(move |_: ()| actions.with_value(|a| a.close_modal()));

    view! {
        <Modal open=open on_close=on_close close_on_backdrop_click=false>
            <EntityModalForm actions=actions modal=modal />
        </Modal>
    }
}

/// What the form element says about the session it serves.
fn session_attrs(form: &ModalForm) -> (&'static str, Option<String>, bool) {
    let submitting = matches!(form.phase(), ModalPhase::Submitting(_));
    match form.phase().session() {
        Some(ModalSession::Edit(record)) => ("edit", Some(record.item_id.clone()), submitting),
        _ => ("create", None, submitting),
    }
}

#[component]
fn EntityModalForm(actions: StoredValue<EntityActions>, modal: ModalSignal) -> impl IntoView {
    let attrs = move || modal.with(|m| m.as_ref().map(session_attrs));
    let submitting = move || attrs().is_some_and(|(_, _, s)| s);

    let legend = move || {
        modal.with(|m| m.as_ref().map(|m| m.legend().to_string()).unwrap_or_default())
    };
    let error = move || modal.with(|m| m.as_ref().and_then(|m| m.error().map(String::from)));

    let hidden = move || {
        modal.with(|m| {
            let form = m.as_ref()?;
            let lock = form.schema().lock_on_edit.as_ref()?;
            let key = form
                .schema()
                .fields
                .iter()
                .find(|f| f.control_id == lock.control_id)
                .map(|f| f.wire_key.clone())?;
            form.carried(&key).map(|v| (key, v.to_string()))
        })
        .map(|(key, value)| view! { <input type="hidden" name=key value=value /> })
    };

    // Rebuild the controls only when a different schema is loaded, not on every keystroke.
    let schema_key = Memo::new(move |_| {
        modal.with(|m| {
            m.as_ref()
                .map(|m| (m.schema().module.clone(), m.schema().subtype.clone()))
        })
    });
    let fields = move || {
        schema_key.track();
        modal
            .with_untracked(|m| m.as_ref().map(|m| m.schema().fields.clone()))
            .unwrap_or_default()
            .into_iter()
            .map(|field| field_view(field, actions, modal))
            .collect_view()
    };

    view! {
        <form
            data-form="modal"
            data-mode=move || attrs().map(|(mode, _, _)| mode)
            data-item-id=move || attrs().and_then(|(_, id, _)| id)
            novalidate=true
            on:submit=move |ev: web_sys::SubmitEvent| {
                ev.prevent_default();
                actions.with_value(|a| a.submit_modal());
            }
        >
            <ModalBody>
                <ModalHeader>
                    <ModalTitle>{legend}</ModalTitle>
                </ModalHeader>
                {hidden}
                {fields}
                {move || {
                    error()
                        .map(|msg| {
                            view! {
                                <Alert tone=AlertTone::Destructive>
                                    <AlertDescription>{msg}</AlertDescription>
                                </Alert>
                            }
                        })
                }}
                <ModalFooter>
                    <Button
                        variant=ButtonVariant::Outline
                        on:click=move |ev: web_sys::MouseEvent| {
                            ev.prevent_default();
                            actions.with_value(|a| a.close_modal());
                        }
                    >
                        "Cancel"
                    </Button>
                    <Button attr:disabled=submitting>
                        <Show when=submitting fallback=|| ().into_view()>
                            <Spinner />
                        </Show>
                        "Save"
                    </Button>
                </ModalFooter>
            </ModalBody>
        </form>
    }
}

fn field_view(
    field: FieldDescriptor,
    actions: StoredValue<EntityActions>,
    modal: ModalSignal,
) -> impl IntoView {
    let control = field.control_id.clone();
    let error_id = format!("{control}-error");

    let value = from_modal(modal, control.clone(), |m, c| {
        m.control(c).map(|s| s.value.clone()).unwrap_or_default()
    });
    let disabled = from_modal(modal, control.clone(), |m, c| {
        m.control(c).is_some_and(|s| s.disabled)
    });
    let feedback = from_modal(modal, control.clone(), |m, c| m.validation().feedback(c));
    let invalid = Signal::derive(move || feedback.get().invalid);

    let for_input = control.clone();
    let on_value = Callback::new(move |v: String| {
        actions.with_value(|a| a.on_field_input(&for_input, &v));
    });

    let widget = match field.kind.clone() {
        FieldKind::Boolean => {
            let checked = from_modal(modal, control.clone(), |m, c| {
                m.control(c).is_some_and(|s| s.checked)
            });
            let for_check = control.clone();
            view! {
                <Checkbox
                    id=control.clone()
                    name=field.wire_key.clone()
                    checked=checked
                    disabled=disabled
                    on_checked=Callback::new(move |c: bool| {
                        actions.with_value(|a| a.set_checked(&for_check, c));
                    })
                />
            }
            .into_any()
        }
        FieldKind::Choice(_) => {
            let options = from_modal(modal, control.clone(), |m, c| {
                m.options_for(c)
                    .into_iter()
                    .map(|o| (o.value, o.label))
                    .collect::<Vec<_>>()
            });
            view! {
                <NativeSelect
                    id=control.clone()
                    name=field.wire_key.clone()
                    options=options
                    value=value
                    invalid=invalid
                    disabled=disabled
                    on_value=on_value
                />
            }
            .into_any()
        }
        kind => {
            let step = step_attr(&kind);
            view! {
                <Input
                    r#type=kind.input_type()
                    id=control.clone()
                    name=field.wire_key.clone()
                    step=step
                    value=value
                    invalid=invalid
                    disabled=disabled
                    required=field.required
                    on_value=on_value
                    attr:aria-describedby=error_id.clone()
                />
            }
            .into_any()
        }
    };

    view! {
        <div class="flex flex-col gap-2" data-field=field.wire_key.clone()>
            <Label html_for=control required=field.required>{field.label}</Label>
            {widget}
            <p
                id=error_id
                class="text-xs text-destructive"
                class:hidden=move || !feedback.get().visible
            >
                {move || feedback.get().message}
            </p>
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::builtin_schemas;

    #[test]
    fn heading_capitalises_and_spaces_slugs() {
        assert_eq!(heading("time_entries"), "Time entries");
        assert_eq!(heading("tasks"), "Tasks");
        assert_eq!(heading(""), "");
    }

    #[test]
    fn only_decimal_fields_carry_a_step() {
        assert_eq!(step_attr(&FieldKind::Decimal { step: 0.5 }).as_deref(), Some("0.5"));
        assert_eq!(step_attr(&FieldKind::Decimal { step: 1.0 }).as_deref(), Some("1"));
        assert_eq!(step_attr(&FieldKind::Time), None);
        assert_eq!(step_attr(&FieldKind::Text), None);
    }

    #[test]
    fn module_groups_keep_registration_order() {
        let schemas = builtin_schemas().expect("builtin schemas");
        let groups = module_groups(&schemas);

        let modules: Vec<&str> = groups.iter().map(|(m, _)| m.as_str()).collect();
        let mut deduped = modules.clone();
        deduped.dedup();
        assert_eq!(modules, deduped, "each module appears once");

        let total: usize = groups.iter().map(|(_, links)| links.len()).sum();
        assert_eq!(total, schemas.len());

        let first = &schemas[0];
        assert_eq!(groups[0].0, first.module);
        assert_eq!(groups[0].1[0].0, format!("/{}/{}", first.module, first.subtype));
    }
}
