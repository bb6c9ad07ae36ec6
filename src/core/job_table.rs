//! Registry of background and suspended jobs.

use std::fmt;

use nix::unistd::Pid;

use crate::core::job::{Job, JobId, JobState};
use crate::errors::{Error, ErrorKind, Result};

/// Maximum number of live jobs a default [`JobTable`] tracks.
pub const DEFAULT_CAPACITY: usize = 100;

/// Storage for live jobs.
///
/// `JobId::CURRENT` passed to any lookup resolves to the live job with the
/// greatest id. Callers only go through this trait, so the linear-scan
/// [`JobTable`] can be swapped for an indexed map.
pub trait JobStore: fmt::Debug {
    /// Registers the processes of one pipeline as a new Running job.
    fn add_pipeline(&mut self, pids: &[Pid], command_text: &str, background: bool)
        -> Result<JobId>;

    /// Registers a single process as a new Running job.
    fn add(&mut self, pid: Pid, command_text: &str, background: bool) -> Result<JobId> {
        self.add_pipeline(&[pid], command_text, background)
    }

    /// Removes a job. Removing an unknown id does nothing.
    fn remove(&mut self, job_id: JobId) -> Option<Job>;

    fn get(&self, job_id: JobId) -> Option<&Job>;

    fn get_mut(&mut self, job_id: JobId) -> Option<&mut Job>;

    fn find_by_pid(&self, pid: Pid) -> Option<&Job>;

    /// Moves a job to `state`. `Done` removes the job; an unknown id is a no-op.
    fn set_state(&mut self, job_id: JobId, state: JobState);

    /// Ids of all live jobs in ascending order.
    fn ids(&self) -> Vec<JobId>;

    fn is_full(&self) -> bool;

    fn len(&self) -> usize {
        self.ids().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the table for display, oldest job first.
    fn list(&self) -> JobListing {
        let ids = self.ids();
        let current = ids.last().cloned();
        let rows: Vec<JobRow> = ids
            .iter()
            .filter_map(|id| self.get(*id))
            .map(|job| JobRow::new(job, Some(job.id()) == current))
            .collect();

        if rows.is_empty() {
            JobListing::NoJobs
        } else {
            JobListing::Jobs(rows)
        }
    }
}

/// Fixed-capacity job table ordered by job id.
pub struct JobTable {
    jobs: Vec<Job>,
    capacity: usize,
    job_count: u32,
}

impl JobTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            jobs: Vec::with_capacity(capacity),
            capacity,
            job_count: 0,
        }
    }

    fn get_next_job_id(&mut self) -> JobId {
        self.job_count += 1;
        JobId(self.job_count)
    }

    fn find_job(&self, job_id: JobId) -> Option<usize> {
        if job_id.is_current() {
            return self
                .jobs
                .iter()
                .enumerate()
                .max_by_key(|(_, job)| job.id())
                .map(|(index, _)| index);
        }

        self.jobs.iter().position(|job| job.id() == job_id)
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl JobStore for JobTable {
    fn add_pipeline(
        &mut self,
        pids: &[Pid],
        command_text: &str,
        background: bool,
    ) -> Result<JobId> {
        if pids.is_empty() {
            return Err(Error::from(ErrorKind::EmptyJob));
        }
        if self.is_full() {
            return Err(Error::from(ErrorKind::JobTableFull));
        }
        if let Some(pid) = pids.iter().find(|pid| self.find_by_pid(**pid).is_some()) {
            return Err(Error::from(ErrorKind::ProcessAlreadyTracked(pid.as_raw())));
        }

        let job_id = self.get_next_job_id();
        self.jobs
            .push(Job::new(job_id, pids, command_text, background)?);
        debug!("added job [{}] for {:?}: {}", job_id, pids, command_text);
        Ok(job_id)
    }

    fn remove(&mut self, job_id: JobId) -> Option<Job> {
        let job_index = self.find_job(job_id)?;
        let job = self.jobs.remove(job_index);
        debug!("removed job [{}]", job.id());
        Some(job)
    }

    fn get(&self, job_id: JobId) -> Option<&Job> {
        self.find_job(job_id).map(|index| &self.jobs[index])
    }

    fn get_mut(&mut self, job_id: JobId) -> Option<&mut Job> {
        match self.find_job(job_id) {
            Some(index) => Some(&mut self.jobs[index]),
            None => None,
        }
    }

    fn find_by_pid(&self, pid: Pid) -> Option<&Job> {
        self.jobs.iter().find(|job| job.has_process(pid))
    }

    fn set_state(&mut self, job_id: JobId, state: JobState) {
        if state == JobState::Done {
            self.remove(job_id);
            return;
        }

        if let Some(job) = self.get_mut(job_id) {
            if job.state() == state {
                debug!("job [{}] is already {}", job.id(), state);
                return;
            }
            debug!("job [{}]: {} -> {}", job.id(), job.state(), state);
            job.set_state(state);
        }
    }

    fn ids(&self) -> Vec<JobId> {
        self.jobs.iter().map(Job::id).collect()
    }

    fn is_full(&self) -> bool {
        self.jobs.len() >= self.capacity
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }
}

impl fmt::Debug for JobTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}/{} jobs\tjob_count: {}",
            self.jobs.len(),
            self.capacity,
            self.job_count
        )?;
        for job in &self.jobs {
            writeln!(f, "id: {}\tinput: {}", job.id(), job.command_text())?;
        }

        Ok(())
    }
}

/// One line of `jobs` output.
#[derive(Clone, Debug, PartialEq)]
pub struct JobRow {
    pub id: JobId,
    pub pid: Pid,
    pub state: JobState,
    pub command_text: String,
    /// Marks the job `fg` and `bg` act on by default.
    pub current: bool,
}

impl JobRow {
    fn new(job: &Job, current: bool) -> Self {
        Self {
            id: job.id(),
            pid: job.pid(),
            state: job.state(),
            command_text: job.command_text().to_string(),
            current,
        }
    }

    fn marker(&self) -> char {
        if self.current {
            '+'
        } else {
            ' '
        }
    }

    /// Same as the `Display` output with the process id after the marker.
    pub fn display_with_pid(&self) -> String {
        format!(
            "[{}]{} {} {}\t\t{}",
            self.id,
            self.marker(),
            self.pid,
            self.state,
            self.command_text
        )
    }
}

impl fmt::Display for JobRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]{} {}\t\t{}",
            self.id,
            self.marker(),
            self.state,
            self.command_text
        )
    }
}

/// Result of listing the table. An empty table is reported explicitly.
#[derive(Clone, Debug, PartialEq)]
pub enum JobListing {
    NoJobs,
    Jobs(Vec<JobRow>),
}

impl fmt::Display for JobListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            JobListing::NoJobs => write!(f, "No jobs"),
            JobListing::Jobs(ref rows) => {
                for (i, row) in rows.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", row)?;
                }
                Ok(())
            }
        }
    }
}
