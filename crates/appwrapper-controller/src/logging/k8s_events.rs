//! Publishing reconcile failures as Kubernetes events.

use std::error::Error;

use kube::runtime::{
    controller,
    events::{Event, EventType, Recorder, Reporter},
};
use tracing::Instrument;

use super::controller::ReconcilerError;
use crate::client::Client;

fn error_to_event<E: ReconcilerError>(err: &E) -> Event {
    let mut full_message = {
        use std::fmt::Write;
        let mut buf = err.to_string();
        let mut err: &dyn Error = err;
        loop {
            err = match err.source() {
                Some(source) => {
                    write!(buf, ": {source}").expect("writing to a String never fails");
                    source
                }
                None => break buf,
            }
        }
    };
    message::truncate_with_ellipsis(&mut full_message, 32_768);

    Event {
        type_: EventType::Warning,
        reason: err.category().to_owned(),
        note: Some(full_message),
        action: "Reconcile".to_owned(),
        secondary: err.secondary_object().map(Into::into),
    }
}

/// Publishes reconcile failures as Kubernetes [`Event`]s on the wrapper or offending secondary
/// object. Intended to run on every `Err` yielded by [`kube::runtime::Controller::run`].
#[tracing::instrument(skip(client))]
pub fn publish_controller_error_as_k8s_event<ReconcileErr, QueueErr>(
    client: &Client,
    controller: &str,
    controller_error: &controller::Error<ReconcileErr, QueueErr>,
) where
    ReconcileErr: ReconcilerError,
    QueueErr: Error,
{
    let (error, obj) = match controller_error {
        controller::Error::ReconcilerFailed(err, obj) => (err, obj),
        _ => return,
    };

    let recorder = Recorder::new(
        client.as_kube_client(),
        Reporter {
            controller: controller.to_owned(),
            instance: None,
        },
        obj.clone().into(),
    );
    let event = error_to_event(error);

    tokio::spawn(
        async move {
            if let Err(err) = recorder.publish(event).await {
                tracing::error!(
                    error = &err as &dyn std::error::Error,
                    "failed to report error as Kubernetes event"
                );
            }
        }
        .in_current_span(),
    );
}

mod message {
    pub fn truncate_with_ellipsis(msg: &mut String, max_len: usize) {
        const ELLIPSIS: char = '…';
        const ELLIPSIS_LEN: usize = ELLIPSIS.len_utf8();
        let len = msg.len();
        if len > max_len {
            let start_of_trunc_char = find_start_of_char(msg, max_len.saturating_sub(ELLIPSIS_LEN));
            msg.truncate(start_of_trunc_char);
            if ELLIPSIS_LEN <= max_len {
                msg.push(ELLIPSIS);
            }
        }
        debug_assert!(msg.len() <= max_len);
    }

    fn find_start_of_char(s: &str, mut pos: usize) -> usize {
        loop {
            if s.is_char_boundary(pos) {
                break pos;
            }
            pos -= 1;
        }
    }

    #[cfg(test)]
    mod tests {
        use super::{find_start_of_char, truncate_with_ellipsis};

        #[test]
        fn truncate_is_noop_if_string_fits() {
            let mut x = "hello".to_owned();
            truncate_with_ellipsis(&mut x, 5);
            assert_eq!(&x, "hello");
        }

        #[test]
        fn truncate_ellipsizes_large_string() {
            let mut x = "hello, this is a much larger string".to_owned();
            truncate_with_ellipsis(&mut x, 4);
            assert_eq!(&x, "h…");
        }

        #[test]
        fn truncate_ellipsizes_emoji_boundary() {
            let mut x = "hello🙋".to_owned();
            truncate_with_ellipsis(&mut x, 8);
            assert_eq!(&x, "hello…");
        }

        #[test]
        fn find_start_of_char_is_noop_for_ascii() {
            assert_eq!(find_start_of_char("hello", 2), 2);
        }
    }
}
