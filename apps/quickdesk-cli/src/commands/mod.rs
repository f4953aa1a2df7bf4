pub mod company;
pub mod member;
pub mod organization;
pub mod payment;
pub mod ticket;

pub use company::{cmd_company_add_employee, cmd_company_create};
pub use member::{
    cmd_license_activate, cmd_license_bulk, cmd_license_can_add, cmd_license_revoke,
    cmd_license_status, cmd_member_add, cmd_member_invite, cmd_member_list, cmd_member_verify,
};
pub use organization::{
    cmd_init, cmd_org_create, cmd_org_list, cmd_org_show, cmd_settings_deadlines,
    cmd_subscription_cancel, cmd_subscription_refresh, cmd_subscription_show,
};
pub use payment::{
    cmd_payment_cancel, cmd_payment_checkout, cmd_payment_confirm, cmd_payment_fail,
    cmd_payment_list, cmd_payment_webhook,
};
pub use ticket::{
    cmd_ticket_activity, cmd_ticket_delete, cmd_ticket_ingest, cmd_ticket_list, cmd_ticket_show,
    cmd_ticket_since, cmd_ticket_unarchive, cmd_ticket_update,
};
