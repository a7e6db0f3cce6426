//! Submit a document to Armada and wait for its notebooks to start.
//!
//! The whole file is translated before the first network call, so a bad
//! entry anywhere aborts the batch with nothing submitted.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::armada::{ArmadaClient, JobState, JobSubmitRequest};
use crate::config::Defaults;
use crate::document::SubmissionDocument;
use crate::{Error, Result, JUPYTER_PORT};

/// Default interval between event polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Outcome for one submitted job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedJob {
    /// Armada job id
    pub job_id: String,
    /// Queue the job was submitted to
    pub queue: String,
    /// Notebook URL, once the job reached running
    pub url: Option<String>,
    /// Last state observed
    pub state: Option<JobState>,
}

/// Outcome of a whole submission
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmitReport {
    /// Jobs in submission order
    pub jobs: Vec<SubmittedJob>,
}

/// Where a job's notebook will be reachable
#[derive(Clone, Debug)]
struct UrlTemplate {
    container: String,
    port: u32,
    namespace: String,
}

/// Notebook URL for a running job, following Armada's ingress host scheme
/// `<container>-<port>-armada-<job_id>-0.<namespace>.<domain>`.
pub fn notebook_url(
    container: &str,
    port: u32,
    job_id: &str,
    namespace: &str,
    defaults: &Defaults,
) -> String {
    let scheme = if defaults.ingress_tls { "https" } else { "http" };
    format!(
        "{}://{}-{}-armada-{}-0.{}.{}",
        scheme, container, port, job_id, namespace, defaults.ingress_domain
    )
}

/// Load, translate, submit and watch a submission file
pub async fn submit_worker<C: ArmadaClient + ?Sized>(
    path: &Path,
    client: &C,
    defaults: &Defaults,
    poll_interval: Duration,
) -> Result<SubmitReport> {
    info!(file = %path.display(), "Getting Submission Objects from {}", path.display());
    let document = SubmissionDocument::load(path, defaults)?;
    submit_document(&document, client, defaults, poll_interval).await
}

/// Submit a translated document and wait until every job is running or has
/// finished.
pub async fn submit_document<C: ArmadaClient + ?Sized>(
    document: &SubmissionDocument,
    client: &C,
    defaults: &Defaults,
    poll_interval: Duration,
) -> Result<SubmitReport> {
    let watch_timeout = document.watch_timeout();
    let deadline = Instant::now()
        .checked_add(watch_timeout)
        .ok_or_else(|| Error::invalid_timeout(format!("{}s", watch_timeout.as_secs())))?;

    // Submit every queue's batch before watching any of them
    let requests = document.to_requests(defaults);
    let mut submitted = Vec::with_capacity(requests.len());
    for request in &requests {
        submitted.push(submit_request(request, client).await?);
    }

    let mut report = SubmitReport::default();
    for (request, mut jobs) in requests.iter().zip(submitted) {
        watch_job_set(request, &mut jobs, client, defaults, deadline, poll_interval).await?;
        report.jobs.extend(jobs.into_iter().map(|(job, _)| job));
    }
    Ok(report)
}

async fn submit_request<C: ArmadaClient + ?Sized>(
    request: &JobSubmitRequest,
    client: &C,
) -> Result<Vec<(SubmittedJob, UrlTemplate)>> {
    info!(
        queue = %request.queue,
        job_set_id = %request.job_set_id,
        "Submitting {} Jobs to Armada",
        request.job_request_items.len()
    );

    let response = client.submit_jobs(request).await?;
    if response.job_response_items.len() != request.job_request_items.len() {
        return Err(Error::client(format!(
            "submitted {} jobs but Armada answered for {}",
            request.job_request_items.len(),
            response.job_response_items.len()
        )));
    }

    request
        .job_request_items
        .iter()
        .zip(response.job_response_items)
        .map(|(item, response)| {
            if let Some(error) = response.error.filter(|e| !e.is_empty()) {
                return Err(Error::client(format!("job rejected: {}", error)));
            }

            let port = item
                .ingress
                .iter()
                .flat_map(|i| i.ports.iter().copied())
                .next()
                .unwrap_or(JUPYTER_PORT);
            let container = item
                .pod_spec
                .container_for_port(port)
                .map(|c| c.name.clone())
                .unwrap_or_default();

            info!(job_id = %response.job_id, queue = %request.queue, "job submitted");
            Ok((
                SubmittedJob {
                    job_id: response.job_id,
                    queue: request.queue.clone(),
                    url: None,
                    state: Some(JobState::Submitted),
                },
                UrlTemplate {
                    container,
                    port,
                    namespace: item.namespace.clone(),
                },
            ))
        })
        .collect()
}

/// Poll the job set's events until every job in `jobs` is running or done.
async fn watch_job_set<C: ArmadaClient + ?Sized>(
    request: &JobSubmitRequest,
    jobs: &mut [(SubmittedJob, UrlTemplate)],
    client: &C,
    defaults: &Defaults,
    deadline: Instant,
    poll_interval: Duration,
) -> Result<()> {
    let index: BTreeMap<String, usize> = jobs
        .iter()
        .enumerate()
        .map(|(i, (job, _))| (job.job_id.clone(), i))
        .collect();
    let mut from_message_id: Option<String> = None;

    loop {
        let settled = jobs
            .iter()
            .filter(|(job, _)| job.url.is_some() || job.state.is_some_and(|s| s.is_terminal()))
            .count();
        if settled == jobs.len() {
            return Ok(());
        }

        if Instant::now() > deadline {
            return Err(Error::WatchTimeout(format!(
                "{} of {} jobs in queue {} job set {} to start",
                jobs.len() - settled,
                jobs.len(),
                request.queue,
                request.job_set_id
            )));
        }

        let messages = client
            .job_set_events(&request.queue, &request.job_set_id, from_message_id.clone())
            .await?;

        if messages.is_empty() {
            debug!(job_set_id = %request.job_set_id, "Waiting for jobs to start...");
            tokio::time::sleep(poll_interval).await;
            continue;
        }

        for message in messages {
            from_message_id = Some(message.id.clone());
            let Some((state, event)) = message.message.state() else {
                continue;
            };
            let Some(&i) = index.get(&event.job_id) else {
                continue;
            };
            let (job, template) = &mut jobs[i];
            job.state = Some(state);

            match state {
                JobState::Running => {
                    let url = notebook_url(
                        &template.container,
                        template.port,
                        &job.job_id,
                        &template.namespace,
                        defaults,
                    );
                    info!(job_id = %job.job_id, %url, "Jupyter notebook is running at {}", url);
                    job.url = Some(url);
                }
                JobState::Failed => {
                    return Err(Error::JobFailed {
                        job_id: job.job_id.clone(),
                        reason: event.reason.clone().unwrap_or_else(|| "unknown".to_string()),
                    });
                }
                JobState::Cancelled | JobState::Preempted => {
                    return Err(Error::JobFailed {
                        job_id: job.job_id.clone(),
                        reason: format!("{:?}", state).to_lowercase(),
                    });
                }
                JobState::Succeeded => {
                    warn!(job_id = %job.job_id, "job finished before it was seen running");
                }
                _ => debug!(job_id = %job.job_id, ?state, "job state changed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::armada::{
        EventMessage, EventStreamMessage, JobEvent, JobSubmitResponse, JobSubmitResponseItem,
        MockArmadaClient,
    };

    fn event(id: &str, state: JobState, job_id: &str) -> EventStreamMessage {
        EventStreamMessage {
            id: id.to_string(),
            message: EventMessage::for_state(
                state,
                JobEvent {
                    job_id: job_id.to_string(),
                    ..Default::default()
                },
            ),
        }
    }

    fn accepted(ids: &[&str]) -> JobSubmitResponse {
        JobSubmitResponse {
            job_response_items: ids
                .iter()
                .map(|id| JobSubmitResponseItem {
                    job_id: id.to_string(),
                    error: None,
                })
                .collect(),
        }
    }

    fn document(yaml: &str) -> SubmissionDocument {
        SubmissionDocument::from_yaml_str(yaml, &Defaults::default()).unwrap()
    }

    #[test]
    fn url_follows_armada_host_scheme() {
        let url = notebook_url("jupyterlab", 8888, "test_job_id", "jupyter", &Defaults::default());
        assert_eq!(url, "http://jupyterlab-8888-armada-test_job_id-0.jupyter.domain.com");

        let tls = Defaults {
            ingress_tls: true,
            ..Default::default()
        };
        assert!(notebook_url("a", 1, "j", "ns", &tls).starts_with("https://"));
    }

    #[tokio::test]
    async fn running_job_reports_url() {
        let mut client = MockArmadaClient::new();
        client
            .expect_submit_jobs()
            .times(1)
            .returning(|_| Ok(accepted(&["job-1"])));
        client
            .expect_job_set_events()
            .times(1)
            .returning(|_, _, _| {
                Ok(vec![
                    event("1", JobState::Queued, "job-1"),
                    event("2", JobState::Running, "job-1"),
                ])
            });

        let doc = document("jobs: [{name: nb, image: img}]");
        let report = submit_document(&doc, &client, &Defaults::default(), Duration::from_millis(1))
            .await
            .unwrap();

        assert_eq!(report.jobs.len(), 1);
        assert_eq!(
            report.jobs[0].url.as_deref(),
            Some("http://nb-8888-armada-job-1-0.jupyter.domain.com")
        );
        assert_eq!(report.jobs[0].state, Some(JobState::Running));
    }

    #[tokio::test]
    async fn resumes_from_last_message_id() {
        let mut client = MockArmadaClient::new();
        client
            .expect_submit_jobs()
            .returning(|_| Ok(accepted(&["job-1"])));

        let mut seq = mockall::Sequence::new();
        client
            .expect_job_set_events()
            .withf(|_, _, from| from.is_none())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(vec![event("7", JobState::Pending, "job-1")]));
        client
            .expect_job_set_events()
            .withf(|_, _, from| from.as_deref() == Some("7"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(vec![event("8", JobState::Running, "job-1")]));

        let doc = document("jobs: [{name: nb, image: img}]");
        let report = submit_document(&doc, &client, &Defaults::default(), Duration::from_millis(1))
            .await
            .unwrap();
        assert!(report.jobs[0].url.is_some());
    }

    #[tokio::test]
    async fn failed_job_aborts_with_reason() {
        let mut client = MockArmadaClient::new();
        client
            .expect_submit_jobs()
            .returning(|_| Ok(accepted(&["job-1"])));
        client.expect_job_set_events().returning(|_, _, _| {
            let mut failed = event("1", JobState::Failed, "job-1");
            if let Some(e) = failed.message.failed.as_mut() {
                e.reason = Some("ImagePullBackOff".to_string());
            }
            Ok(vec![failed])
        });

        let doc = document("jobs: [{name: nb, image: img}]");
        let err = submit_document(&doc, &client, &Defaults::default(), Duration::from_millis(1))
            .await
            .unwrap_err();
        match err {
            Error::JobFailed { job_id, reason } => {
                assert_eq!(job_id, "job-1");
                assert_eq!(reason, "ImagePullBackOff");
            }
            other => panic!("expected JobFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_item_is_client_error() {
        let mut client = MockArmadaClient::new();
        client.expect_submit_jobs().returning(|_| {
            Ok(JobSubmitResponse {
                job_response_items: vec![JobSubmitResponseItem {
                    job_id: String::new(),
                    error: Some("queue does not exist".to_string()),
                }],
            })
        });
        client.expect_job_set_events().never();

        let doc = document("jobs: [{name: nb, image: img}]");
        let err = submit_document(&doc, &client, &Defaults::default(), Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("queue does not exist"));
    }

    #[tokio::test(start_paused = true)]
    async fn watch_times_out() {
        let mut client = MockArmadaClient::new();
        client
            .expect_submit_jobs()
            .returning(|_| Ok(accepted(&["job-1"])));
        client
            .expect_job_set_events()
            .returning(|_, _, _| Ok(Vec::new()));

        let doc = document("jobs: [{name: nb, image: img, timeout: 10s}]");
        let err = submit_document(&doc, &client, &Defaults::default(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WatchTimeout(_)), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_queue_does_not_hold_back_later_queues() {
        let submitted = std::sync::Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let seen = submitted.clone();

        let mut client = MockArmadaClient::new();
        client.expect_submit_jobs().times(2).returning(move |request| {
            seen.lock().unwrap().push(request.queue.clone());
            let job_id = format!("{}-job", request.queue);
            Ok(accepted(&[job_id.as_str()]))
        });
        client
            .expect_job_set_events()
            .returning(|_, _, _| Ok(Vec::new()));

        let doc = document(
            "jobs:\n  - {name: a, image: img, armada_queue: q1, timeout: 10s}\n  - {name: b, image: img, armada_queue: q2, timeout: 10s}",
        );
        let err = submit_document(&doc, &client, &Defaults::default(), Duration::from_secs(2))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::WatchTimeout(_)), "{err}");
        assert_eq!(*submitted.lock().unwrap(), ["q1", "q2"]);
    }

    #[tokio::test]
    async fn int64_max_timeout_fails_before_submitting() {
        let mut client = MockArmadaClient::new();
        client.expect_submit_jobs().never();
        client.expect_job_set_events().never();

        let doc = document("jobs: [{name: nb, image: img, timeout: '9223372036854775807s'}]");
        let err = submit_document(&doc, &client, &Defaults::default(), Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTimeoutFormat { .. }), "{err}");
    }

    #[tokio::test]
    async fn events_for_other_jobs_are_ignored() {
        let mut client = MockArmadaClient::new();
        client
            .expect_submit_jobs()
            .returning(|_| Ok(accepted(&["mine"])));
        client.expect_job_set_events().returning(|_, _, _| {
            Ok(vec![
                event("1", JobState::Failed, "someone-else"),
                event("2", JobState::Running, "mine"),
            ])
        });

        let doc = document("jobs: [{name: nb, image: img}]");
        let report = submit_document(&doc, &client, &Defaults::default(), Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(report.jobs[0].job_id, "mine");
    }
}
