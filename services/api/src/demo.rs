use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::Args;
use followup::error::AppError;
use followup::workflows::nurture::memory::{InMemoryDirectory, InMemoryNurtureStore};
use followup::workflows::nurture::{
    AgentId, AgentProfile, DeliveryError, DeliveryReceipt, DispatchConfig, DispatchReport,
    EmailSender, LeadContact, LeadId, NurtureEngine, SequenceDraft, SmsSender, StepChannel,
    StepDraft,
};

use crate::infra::PassthroughEnhancer;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Enrollment date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) start: Option<NaiveDate>,
    /// Show the message preview before the first dispatch pass.
    #[arg(long)]
    pub(crate) show_preview: bool,
}

/// Email transport that prints the outgoing message for demo output.
struct PrintingEmailSender;

impl EmailSender for PrintingEmailSender {
    fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        println!("  [email -> {to}] {subject}");
        println!("    {body}");
        Ok(DeliveryReceipt {
            provider_message_id: "demo-email".to_string(),
        })
    }
}

struct PrintingSmsSender;

impl SmsSender for PrintingSmsSender {
    fn send_sms(&self, to: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError> {
        println!("  [sms -> {to}] {body}");
        Ok(DeliveryReceipt {
            provider_message_id: "demo-sms".to_string(),
        })
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let start_date = args.start.unwrap_or_else(|| Local::now().date_naive());
    let start = demo_timestamp(start_date);

    let directory = Arc::new(InMemoryDirectory::default());
    let agent = AgentId("agent-demo".to_string());
    directory.insert_agent(AgentProfile {
        id: agent.clone(),
        name: "Jordan Avery".to_string(),
        signature: "Jordan Avery, Meridian Realty Group".to_string(),
        messaging_enabled: true,
    });
    let lead = LeadId("lead-demo".to_string());
    directory.insert_lead(LeadContact {
        id: lead.clone(),
        first_name: "Casey".to_string(),
        last_name: "Nguyen".to_string(),
        email: Some("casey.nguyen@example.com".to_string()),
        phone: Some("+15155550177".to_string()),
        property_address: Some("27 Alder Point Dr".to_string()),
    });

    let engine = NurtureEngine::new(
        Arc::new(InMemoryNurtureStore::default()),
        directory,
        Arc::new(PassthroughEnhancer),
        Arc::new(PrintingEmailSender),
        Arc::new(PrintingSmsSender),
        DispatchConfig::default(),
    );

    println!("Lead follow-up scheduler demo");
    println!(
        "Enrolling lead {lead} in a two-step sequence on {start_date} (agent {agent})"
    );

    let (sequence, steps) = engine.create_sequence(&agent, demo_draft())?;
    println!("\nAuthored sequence '{}' ({})", sequence.id, sequence.name);
    for step in &steps {
        println!(
            "- step {} | +{}d | {:?} | {}",
            step.step_order,
            step.delay_days,
            step.channel,
            step.message_template.raw()
        );
    }

    let (enrollment, scheduled) = engine.enroll(&agent, &lead, &sequence.id, start)?;
    println!(
        "\nEnrollment {} active at step {} with {} record(s) queued",
        enrollment.id,
        enrollment.current_step,
        scheduled.len()
    );

    if args.show_preview {
        let preview = engine.preview(&agent, &scheduled[0].id)?;
        println!("\nPreview of the first message:");
        println!("  template: {}", preview.original_template);
        println!("  rendered: {}", preview.rendered_content);
    }

    println!("\nDispatch pass on {start_date}");
    let report = engine.run_for_agent(&agent, start)?;
    print_report(&report);

    let midway = engine.enrollment_view(&agent, &enrollment.id)?;
    println!(
        "Enrollment now at step {} ({}), next send {}",
        midway.current_step,
        midway.status,
        midway
            .next_send_at
            .map(|at| at.date_naive().to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    let day_three = start + Duration::days(3);
    println!("\nDispatch pass on {}", day_three.date_naive());
    let report = engine.run_for_agent(&agent, day_three)?;
    print_report(&report);

    let done = engine.enrollment_view(&agent, &enrollment.id)?;
    println!(
        "Enrollment finished with status {} after step {}",
        done.status, done.current_step
    );

    Ok(())
}

fn print_report(report: &DispatchReport) {
    println!(
        "  sent {} | failed {} | requeued {}",
        report.sent_count(),
        report.failed_count(),
        report.retried_count()
    );
}

fn demo_timestamp(date: NaiveDate) -> DateTime<Utc> {
    let nine_am = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default();
    Utc.from_utc_datetime(&date.and_time(nine_am))
}

fn demo_draft() -> SequenceDraft {
    SequenceDraft {
        name: "Post-showing follow-up".to_string(),
        description: "Immediate thank-you email, sms check-in three days later".to_string(),
        is_active: true,
        steps: vec![
            StepDraft {
                step_order: 1,
                delay_days: 0,
                channel: StepChannel::Email,
                subject: Some("Thanks for touring {property_address}".to_string()),
                message_template:
                    "Hi {first_name}, great meeting you at {property_address} today. {agent_signature}"
                        .to_string(),
                use_ai_enhancement: false,
            },
            StepDraft {
                step_order: 2,
                delay_days: 3,
                channel: StepChannel::Sms,
                subject: None,
                message_template: "Hi {first_name}, any questions about {property_address}?"
                    .to_string(),
                use_ai_enhancement: false,
            },
        ],
    }
}
