//! Block Kit modal and message builders, plus the ids the form parsers read
//! back.

use serde_json::{json, Value};
use sf_core::report::{AckColumn, Organization, TicketColumn, TicketPriority};

pub mod callback {
    pub const MAIN_MENU: &str = "task-menu";
    pub const REPORT: &str = "report_function";
    pub const RELEVANT_TICKET: &str = "relevant_function";
    pub const QUERY_FINDER: &str = "query_finder_function";
    pub const HOME: &str = "home_modal";
    pub const QUERY_SHAPER: &str = "query_generator_view";
    pub const LQS_GENERATOR: &str = "help_modal";
    pub const ACK_COLUMNS: &str = "help_modal_updated";
    pub const QUERY_RESULT: &str = "query_modal";
}

/// Main menu button action ids.
pub mod menu {
    pub const REPORT: &str = "report";
    pub const RELEVANT_TICKET: &str = "relevant_ticket";
    pub const QUERY_CRAFTER: &str = "Query_Crafter";
    pub const QUERY_FINDER: &str = "query_finder";
}

/// `(block_id, action_id)` pairs of every input the bot reads.
pub mod field {
    pub type Field = (&'static str, &'static str);

    pub const START_DATE: Field = ("start_date_block", "start_date_picker");
    pub const END_DATE: Field = ("end_date_block", "end_date_picker");

    pub const REPORT_COLUMNS: Field = ("selected_columns_block", "selected_columns_select");
    pub const ORGANIZATIONS: Field = ("organization_block", "organization_select");
    pub const PRIORITIES: Field = ("priority_block", "priority_select");

    pub const CRAFTER_CHOICE: Field = ("crafter_choice_block", "radio_buttons-action");

    pub const SHAPER_PLACEMENT: Field = ("placement_id_input", "placement_id");
    pub const SHAPER_NETWORK: Field = ("network_id_input", "network_id");
    pub const SHAPER_COLUMNS: Field = ("shaper_columns_block", "selected_columns_select");

    pub const LQS_PLACEMENT: Field = ("placement_id_block", "placement_id-input");
    pub const LQS_NETWORK: Field = ("network_id_block", "plain_text_input-action");
    pub const LQS_QUERY_TYPE: Field = ("query_type_block", "query_type_select-action");
    pub const LQS_DELIVERY: Field = ("delivery_block", "actionId-0");

    pub const ACK_COLUMNS: Field = ("ack_columns_block", "ack_columns_select-action");

    pub const FINDER_KEYWORDS: Field = ("columns_input_block", "columns_input");
}

/// Radio values of the Query Crafter home modal.
pub const CHOICE_SHAPER: &str = "value-1";
pub const CHOICE_LQS: &str = "value-2";

/// Delivery values of the LQS generator: show the SQL, or run it.
pub const DELIVERY_SHOW: &str = "value-0";
pub const DELIVERY_RUN: &str = "value-1";

/// Transaction columns offered by the Query Shaper.
pub const SHAPER_COLUMNS: &[&str] = &[
    "transaction__request",
    "transaction__request__slots__time_position_class",
    "transaction__request__context__network_id",
    "transaction__request__context__profile_id",
    "transaction__request__context__standard_genre_ids",
    "transaction__request__context__network__network_id",
    "transaction__request__context__standard_programmer_id",
    "transaction__request__context__site_section_id",
    "transaction__request__advertisements__placement_id",
    "transaction__acks__creative_id",
    "transaction__request__visitor__user_agent_device_type",
    "transaction__request__visitor__user_agent",
    "transaction__request__advertisements__creative_id",
    "transaction__request__visitor__postal_code",
    "transaction__request__context__network__geo_zipcode_visibility",
    "transaction__request__context__standard_channel_id",
    "transaction__request__context__content_rating_id",
    "transaction__request__context__asset_id",
    "transaction__request__time_record__total",
    "transaction__request__context__standard_endpoint_id",
    "transaction__request__backend_filtration_reason",
    "transaction__request__visitor__user_id",
    "transaction__request__context__standard_brand_id",
    "transaction__request__visitor__postal_code_id",
    "transaction__request__visitor__standard_device_type_ids",
    "transaction__request__audience_item__audience_item_id",
    "transaction__request__context__standard_endpoint_owner_id",
    "transaction__request__context__custom_asset_id",
    "transaction__request__errors__site_section_id",
    "transaction__request__inventory_group__group_id",
    "transaction__acks__ad_impression",
];

fn plain(text: &str) -> Value {
    json!({ "type": "plain_text", "text": text })
}

fn option(text: &str, value: &str) -> Value {
    json!({ "text": plain(text), "value": value })
}

fn modal(callback_id: &str, title: &str, blocks: Vec<Value>, submit: Option<&str>) -> Value {
    let mut view = json!({
        "type": "modal",
        "callback_id": callback_id,
        "title": plain(title),
        "close": plain("Close"),
        "blocks": blocks,
    });
    if let Some(submit) = submit {
        view["submit"] = plain(submit);
    }
    view
}

fn input(field: field::Field, label: &str, element: Value, optional: bool) -> Value {
    let mut element = element;
    element["action_id"] = json!(field.1);
    json!({
        "type": "input",
        "block_id": field.0,
        "optional": optional,
        "element": element,
        "label": plain(label),
    })
}

fn text_input(field: field::Field, label: &str, placeholder: &str, optional: bool) -> Value {
    input(
        field,
        label,
        json!({ "type": "plain_text_input", "placeholder": plain(placeholder) }),
        optional,
    )
}

fn multi_select(field: field::Field, label: &str, placeholder: &str, options: Vec<Value>) -> Value {
    input(
        field,
        label,
        json!({
            "type": "multi_static_select",
            "placeholder": plain(placeholder),
            "options": options,
        }),
        false,
    )
}

fn date_inputs(optional: bool) -> [Value; 2] {
    [
        input(
            field::START_DATE,
            "Start date",
            json!({ "type": "datepicker", "placeholder": plain("Select a start date") }),
            optional,
        ),
        input(
            field::END_DATE,
            "End date",
            json!({ "type": "datepicker", "placeholder": plain("Select an end date") }),
            optional,
        ),
    ]
}

fn section(text: &str) -> Value {
    json!({ "type": "section", "text": { "type": "mrkdwn", "text": text } })
}

fn menu_entry(label: &str, action_id: &str) -> [Value; 2] {
    [
        json!({ "type": "divider" }),
        json!({
            "type": "section",
            "text": plain(label),
            "accessory": {
                "type": "button",
                "text": plain("Click Here"),
                "action_id": action_id,
            },
        }),
    ]
}

pub fn main_menu() -> Value {
    let mut blocks = vec![json!({ "type": "header", "text": plain("Slack Flake") })];
    blocks.extend(menu_entry("Report", menu::REPORT));
    blocks.extend(menu_entry("Relevant ticket", menu::RELEVANT_TICKET));
    blocks.extend(menu_entry("Query Crafter", menu::QUERY_CRAFTER));
    blocks.extend(menu_entry("Query Finder", menu::QUERY_FINDER));
    modal(callback::MAIN_MENU, "Slack Flake", blocks, None)
}

pub fn report_modal() -> Value {
    let columns = TicketColumn::ALL
        .iter()
        .map(|c| option(c.label(), c.code()))
        .collect();
    let organizations = Organization::ALL
        .iter()
        .map(|o| option(o.name(), o.code()))
        .collect();
    let priorities = TicketPriority::ALL
        .iter()
        .map(|p| option(p.label(), p.code()))
        .collect();

    let mut blocks = vec![multi_select(
        field::REPORT_COLUMNS,
        "Selected Columns",
        "Select columns",
        columns,
    )];
    blocks.extend(date_inputs(false));
    blocks.push(multi_select(
        field::ORGANIZATIONS,
        "Organization",
        "Select organization",
        organizations,
    ));
    blocks.push(multi_select(
        field::PRIORITIES,
        "Priority",
        "Select priority",
        priorities,
    ));
    modal(callback::REPORT, "Generate Report", blocks, Some("Submit"))
}

pub fn relevant_ticket() -> Value {
    modal(
        callback::RELEVANT_TICKET,
        "Slack Flake",
        vec![
            json!({ "type": "header", "text": plain("Relevant ticket") }),
            section("This functionality is under construction."),
        ],
        None,
    )
}

pub fn query_finder_modal() -> Value {
    modal(
        callback::QUERY_FINDER,
        "Query Finder",
        vec![text_input(
            field::FINDER_KEYWORDS,
            "Column Names",
            "Enter column names separated by commas",
            false,
        )],
        Some("Find Queries"),
    )
}

pub fn home_modal() -> Value {
    let choice = input(
        field::CRAFTER_CHOICE,
        "What do you want to build?",
        json!({
            "type": "radio_buttons",
            "options": [
                option("Query Shaper (placement filter)", CHOICE_SHAPER),
                option("LQS Query Generator", CHOICE_LQS),
            ],
        }),
        false,
    );
    modal(callback::HOME, "SlakeFlake", vec![choice], Some("Submit"))
}

pub fn query_shaper_modal() -> Value {
    let columns = SHAPER_COLUMNS.iter().map(|c| option(c, c)).collect();
    let mut columns_block = multi_select(
        field::SHAPER_COLUMNS,
        "Selected Columns",
        "Select columns",
        columns,
    );
    columns_block["optional"] = json!(true);

    let mut blocks = vec![
        text_input(field::SHAPER_PLACEMENT, "Placement ID", "Enter Placement ID", false),
        text_input(field::SHAPER_NETWORK, "Network ID", "Enter Network ID", true),
        columns_block,
    ];
    blocks.extend(date_inputs(true));
    modal(callback::QUERY_SHAPER, "Query Shaper", blocks, Some("Submit"))
}

pub fn lqs_generator_modal() -> Value {
    let query_type = input(
        field::LQS_QUERY_TYPE,
        "Query type",
        json!({
            "type": "static_select",
            "placeholder": plain("Select a query"),
            "options": [
                option("Ad Request", "ad_request"),
                option("Transactions", "transactions"),
                option("ACK", "ack"),
            ],
        }),
        false,
    );
    let delivery = input(
        field::LQS_DELIVERY,
        "Delivery",
        json!({
            "type": "static_select",
            "placeholder": plain("Show or run"),
            "options": [
                option("Show query", DELIVERY_SHOW),
                option("Run query", DELIVERY_RUN),
            ],
        }),
        false,
    );

    let mut blocks = vec![
        text_input(field::LQS_PLACEMENT, "Placement ID", "Enter Placement ID", false),
        text_input(field::LQS_NETWORK, "Network ID", "Enter Network ID", false),
        query_type,
    ];
    blocks.extend(date_inputs(false));
    blocks.push(delivery);
    modal(callback::LQS_GENERATOR, "LQS Query Generator", blocks, Some("Submit"))
}

/// Second ACK step. `metadata` carries the first step's fields.
pub fn ack_columns_modal(metadata: &str) -> Value {
    let options: Vec<Value> = AckColumn::ALL
        .iter()
        .map(|c| option(c.key(), c.key()))
        .collect();
    let mut view = modal(
        callback::ACK_COLUMNS,
        "Pick the Columns",
        vec![input(
            field::ACK_COLUMNS,
            "Columns",
            json!({ "type": "checkboxes", "options": options }),
            false,
        )],
        Some("Submit"),
    );
    view["private_metadata"] = json!(metadata);
    view
}

fn result_blocks(heading: &str, body: &str, pqm_link: &str) -> Vec<Value> {
    vec![
        section(&format!("{}\n\n*Result:*\n{}", heading, body)),
        section(&format!(
            "*Here is the PQM link:*\n<{}|Click here to view PQM>",
            pqm_link
        )),
    ]
}

/// Modal showing generated SQL instead of running it.
pub fn query_result_modal(sql: &str, pqm_link: &str) -> Value {
    modal(
        callback::QUERY_RESULT,
        "Query Result",
        result_blocks(
            "Retrieved Query successfully.",
            &format!("```{}```", sql),
            pqm_link,
        ),
        None,
    )
}

/// DM blocks after running an LQS query.
pub fn query_executed_blocks(summary: &str, pqm_link: &str) -> Value {
    json!(result_blocks("Query executed successfully.", summary, pqm_link))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action_ids(view: &Value) -> Vec<String> {
        view["blocks"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|b| {
                b["accessory"]["action_id"]
                    .as_str()
                    .or_else(|| b["element"]["action_id"].as_str())
                    .map(str::to_string)
            })
            .collect()
    }

    #[test]
    fn test_main_menu_has_four_entries() {
        let view = main_menu();
        assert_eq!(
            action_ids(&view),
            vec!["report", "relevant_ticket", "Query_Crafter", "query_finder"]
        );
        assert!(view.get("submit").is_none());
    }

    #[test]
    fn test_report_modal_offers_all_options() {
        let view = report_modal();
        assert_eq!(view["callback_id"], "report_function");
        let orgs = &view["blocks"][3]["element"]["options"];
        assert_eq!(orgs.as_array().unwrap().len(), 10);
        assert_eq!(orgs[0]["value"], "org_1");
        assert_eq!(orgs[0]["text"]["text"], "NBC Universal");
    }

    #[test]
    fn test_ack_modal_carries_metadata() {
        let view = ack_columns_modal("{\"a\":1}");
        assert_eq!(view["private_metadata"], "{\"a\":1}");
        assert_eq!(
            view["blocks"][0]["element"]["options"].as_array().unwrap().len(),
            7
        );
    }

    #[test]
    fn test_query_result_modal_links_pqm() {
        let view = query_result_modal("SELECT 1", "https://pqm/x");
        let text = view["blocks"][1]["text"]["text"].as_str().unwrap();
        assert!(text.contains("<https://pqm/x|Click here to view PQM>"));
    }
}
