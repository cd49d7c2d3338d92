mod settings;

pub use settings::{
    DeliverySettings, JwtConfig, LogFormat, OtelConfig, ServerConfig, Settings, ShutdownSettings,
    SmtpConfig, SmtpTls, TemplateSettings,
};
