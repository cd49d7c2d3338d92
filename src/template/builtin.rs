//! Templates shipped with the service for the account and billing flows.

use super::types::{Template, TemplateFormat};

/// All built-in templates
pub fn builtin_templates() -> Vec<Template> {
    vec![
        welcome(),
        activation_code(),
        password_reset(),
        invoice(),
        contract(),
        debt_notice(),
        contact(),
    ]
}

fn welcome() -> Template {
    Template {
        id: "welcome".to_string(),
        name: "Welcome".to_string(),
        subject: "Welcome to the platform".to_string(),
        format: TemplateFormat::Html,
        html: Some(
            "<html><body><h1>Welcome!</h1>\
             <p>Your account has been created and is ready to use.</p></body></html>"
                .to_string(),
        ),
        text: Some("Welcome! Your account has been created and is ready to use.".to_string()),
        document: None,
        required: vec![],
        file_name: None,
        reply_to: None,
        cc: None,
        description: Some("Sent after an account is registered".to_string()),
    }
}

fn activation_code() -> Template {
    Template {
        id: "activation-code".to_string(),
        name: "Account activation code".to_string(),
        subject: "Your activation code".to_string(),
        format: TemplateFormat::Html,
        html: Some(
            "<html><body><p>Use the code <strong>{{code}}</strong> to activate your account.</p>\
             <p>The code expires in {{expires_minutes}} minutes.</p></body></html>"
                .to_string(),
        ),
        text: Some(
            "Use the code {{code}} to activate your account. \
             The code expires in {{expires_minutes}} minutes."
                .to_string(),
        ),
        document: None,
        required: vec!["code".to_string(), "expires_minutes".to_string()],
        file_name: None,
        reply_to: None,
        cc: None,
        description: Some("One-time code for account activation".to_string()),
    }
}

fn password_reset() -> Template {
    Template {
        id: "password-reset".to_string(),
        name: "Password reset code".to_string(),
        subject: "Password reset requested".to_string(),
        format: TemplateFormat::Html,
        html: Some(
            "<html><body><p>A password reset was requested for your account.</p>\
             <p>Your reset code is <strong>{{code}}</strong>.</p>\
             <p>If you did not request it, ignore this message.</p></body></html>"
                .to_string(),
        ),
        text: Some(
            "A password reset was requested for your account. Your reset code is {{code}}. \
             If you did not request it, ignore this message."
                .to_string(),
        ),
        document: None,
        required: vec!["code".to_string()],
        file_name: None,
        reply_to: None,
        cc: None,
        description: Some("One-time code for password recovery".to_string()),
    }
}

fn invoice() -> Template {
    Template {
        id: "invoice".to_string(),
        name: "Invoice".to_string(),
        subject: "Invoice {{invoice_number}}".to_string(),
        format: TemplateFormat::Pdf,
        html: None,
        text: Some("Please find attached invoice {{invoice_number}}.".to_string()),
        document: Some(
            "Invoice {{invoice_number}}\n\
             Customer: {{customer}}\n\
             Issued: {{issued_on}}\n\
             \n\
             Total due: {{total}}"
                .to_string(),
        ),
        required: vec![
            "invoice_number".to_string(),
            "customer".to_string(),
            "issued_on".to_string(),
            "total".to_string(),
        ],
        file_name: Some("invoice-{{invoice_number}}.pdf".to_string()),
        reply_to: None,
        cc: None,
        description: Some("Billing document rendered as PDF".to_string()),
    }
}

/// Rental contract; the assigned agent is copied on the same message
fn contract() -> Template {
    Template {
        id: "contract".to_string(),
        name: "Service contract".to_string(),
        subject: "Contract {{contract_number}} for {{property}}".to_string(),
        format: TemplateFormat::Pdf,
        html: None,
        text: Some(
            "Dear {{client}}, please find attached contract {{contract_number}}. \
             Your agent {{agent}} is copied on this message."
                .to_string(),
        ),
        document: Some(
            "Service contract {{contract_number}}\n\
             \n\
             Client: {{client}}\n\
             Agent: {{agent}}\n\
             Property: {{property}}\n\
             Start date: {{start_date}}\n\
             Monthly rent: {{monthly_rent}}\n\
             \n\
             The client agrees to pay the monthly rent in advance within the first five days \
             of each month. Either party may end this contract with thirty days written notice."
                .to_string(),
        ),
        required: vec![
            "contract_number".to_string(),
            "client".to_string(),
            "agent".to_string(),
            "agent_email".to_string(),
            "property".to_string(),
            "start_date".to_string(),
            "monthly_rent".to_string(),
        ],
        file_name: Some("contract-{{contract_number}}.pdf".to_string()),
        reply_to: None,
        cc: Some("{{agent_email}}".to_string()),
        description: Some("Service contract sent to the client and the agent".to_string()),
    }
}

fn debt_notice() -> Template {
    Template {
        id: "debt-notice".to_string(),
        name: "Debt notice".to_string(),
        subject: "Payment overdue for {{property}}".to_string(),
        format: TemplateFormat::Pdf,
        html: None,
        text: Some("Dear {{debtor}}, the attached notice details your overdue balance.".to_string()),
        document: Some(
            "Notice of overdue payment\n\
             \n\
             Debtor: {{debtor}}\n\
             Property: {{property}}\n\
             Months overdue: {{months_overdue}}\n\
             Amount due: {{amount_due}}\n\
             \n\
             Please settle the full amount before {{pay_by}} to avoid further action."
                .to_string(),
        ),
        required: vec![
            "debtor".to_string(),
            "property".to_string(),
            "amount_due".to_string(),
            "months_overdue".to_string(),
            "pay_by".to_string(),
        ],
        file_name: Some("debt-notice.pdf".to_string()),
        reply_to: None,
        cc: None,
        description: Some("Overdue balance notice rendered as PDF".to_string()),
    }
}

/// Website contact form relayed to the operator mailbox
fn contact() -> Template {
    Template {
        id: "contact".to_string(),
        name: "Contact message".to_string(),
        subject: "New contact message from {{name}}".to_string(),
        format: TemplateFormat::Html,
        html: Some(
            "<html><body><h2>New contact message</h2>\
             <p><strong>Name:</strong> {{name}}</p>\
             <p><strong>Email:</strong> {{email}}</p>\
             <p><strong>Phone:</strong> {{phone}}</p>\
             <p>{{message}}</p></body></html>"
                .to_string(),
        ),
        text: Some(
            "New contact message from {{name}} ({{email}}, {{phone}}):\n\n{{message}}".to_string(),
        ),
        document: None,
        required: vec![
            "name".to_string(),
            "email".to_string(),
            "phone".to_string(),
            "message".to_string(),
        ],
        file_name: None,
        reply_to: Some("{{email}}".to_string()),
        cc: None,
        description: Some("Contact form message; replies go to the sender".to_string()),
    }
}
